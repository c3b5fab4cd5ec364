//! H.265 NAL unit framing and type classification.
//!
//! H.265 (HEVC) uses a 2-byte NAL unit header (vs. H.264's 1-byte header).
//! The 6-bit NAL type sits in bits 1..6 of the first header byte:
//!
//! ```text
//! first_byte:  F(1) Type(6) LayerId_hi(1)
//! nal_type  =  (first_byte >> 1) & 0x3F
//! ```
//!
//! Codec-config buffers handed to the [parameter-set extractor](crate::paramset)
//! may frame their NAL units either as Annex B (3- or 4-byte start codes) or
//! as 4-byte big-endian length-prefixed records — both forms occur in
//! practice depending on the encoder. [`split_any`] detects and handles
//! both without requiring the caller to know which one it got.

/// VPS NAL type (H.265 NAL type 32).
pub const NAL_TYPE_VPS: u8 = 32;
/// SPS NAL type (H.265 NAL type 33).
pub const NAL_TYPE_SPS: u8 = 33;
/// PPS NAL type (H.265 NAL type 34).
pub const NAL_TYPE_PPS: u8 = 34;
/// Fragmentation Unit NAL type reserved by RFC 7798 packetization (not a
/// real bitstream NAL type — never appears in an access unit).
pub const NAL_TYPE_FU: u8 = 49;

/// Extract the 6-bit H.265 NAL type from a NAL unit's first header byte.
#[inline]
pub fn nal_type(first_header_byte: u8) -> u8 {
    (first_header_byte >> 1) & 0x3F
}

/// Split an Annex-B bitstream into NAL units, stripping start codes.
///
/// Recognizes both the 4-byte (`00 00 00 01`) and 3-byte (`00 00 01`) start
/// code forms, tracking each one's length so that boundaries between
/// adjacent NALs using different start-code widths are computed correctly.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut starts: Vec<(usize, usize)> = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        if i + 3 < data.len() && data[i..i + 4] == [0, 0, 0, 1] {
            starts.push((i + 4, 4));
            i += 4;
        } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
            starts.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nals = Vec::with_capacity(starts.len());
    for (idx, &(start, _)) in starts.iter().enumerate() {
        let end = if idx + 1 < starts.len() {
            let (next_start, next_sc_len) = starts[idx + 1];
            next_start - next_sc_len
        } else {
            data.len()
        };
        if start < end {
            nals.push(&data[start..end]);
        }
    }
    nals
}

/// Split a buffer of 4-byte big-endian length-prefixed NAL records.
///
/// Stops (without error) at the first record whose declared length would
/// run past the end of the buffer — malformed input never panics, it is
/// simply truncated, per the parameter-set extractor's "never raises"
/// contract.
pub fn split_length_prefixed(data: &[u8]) -> Vec<&[u8]> {
    let mut nals = Vec::new();
    let mut i = 0usize;

    while i + 4 <= data.len() {
        let len = u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]) as usize;
        let start = i + 4;
        if len == 0 || start + len > data.len() {
            break;
        }
        nals.push(&data[start..start + len]);
        i = start + len;
    }
    nals
}

/// Whether `data` looks like it starts with a recognizable Annex-B start
/// code at offset 0 (used to pick a framing strategy for codec-config
/// buffers that may mix both forms).
fn starts_with_annex_b(data: &[u8]) -> bool {
    (data.len() >= 4 && data[0..4] == [0, 0, 0, 1]) || (data.len() >= 3 && data[0..3] == [0, 0, 1])
}

/// Split a codec-config buffer that may be Annex B or length-prefixed.
///
/// Picks the framing by sniffing the first few bytes: if they form a
/// recognizable Annex-B start code, scan as Annex B; otherwise fall back
/// to 4-byte length-prefixed framing. Never panics on malformed input —
/// an unrecognized buffer simply yields no NAL units.
pub fn split_any(data: &[u8]) -> Vec<&[u8]> {
    if starts_with_annex_b(data) {
        split_annex_b(data)
    } else {
        split_length_prefixed(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nal_type_extracts_six_bits() {
        // VPS: type 32 -> first byte 0x40 (0100_0000): (0x40 >> 1) & 0x3F = 32
        assert_eq!(nal_type(0x40), NAL_TYPE_VPS);
        // SPS: type 33 -> 0x42
        assert_eq!(nal_type(0x42), NAL_TYPE_SPS);
        // PPS: type 34 -> 0x44
        assert_eq!(nal_type(0x44), NAL_TYPE_PPS);
    }

    #[test]
    fn split_annex_b_4byte_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x40, 0x01, 0xAA];
        data.extend_from_slice(&[0, 0, 0, 1, 0x42, 0x01, 0xBB]);
        let nals = split_annex_b(&data);
        assert_eq!(nals, vec![&[0x40, 0x01, 0xAA][..], &[0x42, 0x01, 0xBB][..]]);
    }

    #[test]
    fn split_annex_b_mixed_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x40, 0x01];
        data.extend_from_slice(&[0, 0, 1, 0x42, 0x01]);
        let nals = split_annex_b(&data);
        assert_eq!(nals, vec![&[0x40, 0x01][..], &[0x42, 0x01][..]]);
    }

    #[test]
    fn split_annex_b_no_start_code_yields_nothing() {
        assert!(split_annex_b(&[0xFF, 0xFE]).is_empty());
    }

    #[test]
    fn split_length_prefixed_two_records() {
        let mut data = vec![0, 0, 0, 2, 0x40, 0x01];
        data.extend_from_slice(&[0, 0, 0, 3, 0x42, 0x01, 0xAA]);
        let nals = split_length_prefixed(&data);
        assert_eq!(nals, vec![&[0x40, 0x01][..], &[0x42, 0x01, 0xAA][..]]);
    }

    #[test]
    fn split_length_prefixed_truncated_record_stops_cleanly() {
        // Declares a length longer than the remaining buffer.
        let data = vec![0, 0, 0, 10, 0x40, 0x01];
        assert!(split_length_prefixed(&data).is_empty());
    }

    #[test]
    fn split_any_detects_annex_b() {
        let data = vec![0, 0, 1, 0x40, 0x01];
        assert_eq!(split_any(&data), vec![&[0x40, 0x01][..]]);
    }

    #[test]
    fn split_any_falls_back_to_length_prefixed() {
        let data = vec![0, 0, 0, 2, 0x40, 0x01];
        assert_eq!(split_any(&data), vec![&[0x40, 0x01][..]]);
    }
}
