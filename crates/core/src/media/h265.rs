//! H.265 (HEVC) RTP packetizer — RFC 7798.
//!
//! Differences from H.264 (RFC 6184) that drive this implementation:
//!
//! - **2-byte NAL unit header** (vs 1-byte in H.264). The NAL type is the
//!   6 bits `(H0 >> 1) & 0x3F`.
//! - **FU (Fragmentation Unit) mode** carries a 2-byte PayloadHdr (the FU's
//!   own NAL header, type 49) followed by a 1-byte FU header
//!   `(S<<7)|(E<<6)|nal_type`, then the fragment bytes.
//! - No aggregation packets (AP) and no DON/DONL — interleaving is
//!   disabled, so every datagram belongs to exactly one access unit in
//!   emission order.
//!
//! One call to [`H265Packetizer::packetize_au`] handles exactly one access
//! unit and returns every RTP datagram that access unit produces, in
//! transmission order, ready to be handed to the datagram ring.

use super::rtp::RtpHeader;
use crate::nal::{NAL_TYPE_FU, nal_type};

/// Default maximum transmission unit for the RTP payload, leaving headroom
/// under the typical 1500-byte network MTU once the 12-byte RTP header and
/// IP/UDP headers are accounted for.
pub const DEFAULT_MTU: usize = 1400;

const RTP_HEADER_LEN: usize = 12;
const FU_PREFIX_LEN: usize = 3;

/// Converts H.265 access units into RTP datagrams per RFC 7798.
///
/// Holds the per-session RTP header state (sequence, timestamp, SSRC) and
/// a scratch buffer sized for the largest access unit seen so far, into
/// which each AU's bytes are copied before packetization — this is what
/// lets the caller release its own buffer back to the encoder the instant
/// `packetize_au` returns, per the access-unit ownership contract.
#[derive(Debug)]
pub struct H265Packetizer {
    header: RtpHeader,
    mtu: usize,
    scratch: Vec<u8>,
    out: Vec<u8>,
}

impl H265Packetizer {
    /// Create with an explicit payload type, SSRC, and MTU.
    ///
    /// The RTP sequence number starts at 1, not 0 — the first datagram of
    /// a freshly started session carries sequence number 1.
    pub fn new(pt: u8, ssrc: u32, mtu: usize) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc, 1),
            mtu,
            scratch: Vec::new(),
            out: Vec::new(),
        }
    }

    /// Create with a random SSRC and the default MTU.
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt, 1),
            mtu: DEFAULT_MTU,
            scratch: Vec::new(),
            out: Vec::new(),
        }
    }

    /// Current RTP sequence number (the one the next datagram will carry).
    pub fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    /// Current RTP timestamp, truncated to 32 bits as written on the wire.
    pub fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }

    /// 90 kHz clock rate per RFC 7798 §7.1.
    pub fn clock_rate(&self) -> u32 {
        90_000
    }

    pub fn payload_type(&self) -> u8 {
        self.header.pt
    }

    /// Compute the RTP timestamp for a presentation timestamp in microseconds.
    ///
    /// `rtp_ts = floor(pts_us * 90 / 1000)`, truncated to 32 bits on write.
    pub fn rtp_timestamp_for(pts_us: u64) -> u64 {
        (pts_us * 90) / 1000
    }

    /// Packetize one access unit, invoking `emit` once per RTP datagram in
    /// transmission order, and returning the datagram count.
    ///
    /// `au` must begin with a two-byte H.265 NAL header. The AU is copied
    /// into the packetizer's scratch buffer first, so the caller's storage
    /// can be released immediately after this call returns. Each datagram
    /// is assembled into the packetizer's own reused `out` buffer and
    /// handed to `emit` by reference — `emit` must copy it into its final
    /// destination (e.g. a preallocated ring slot) rather than retain the
    /// slice, since `out` is overwritten by the next datagram.
    pub fn packetize_au_into(
        &mut self,
        au: &[u8],
        pts_us: u64,
        mut emit: impl FnMut(&[u8]),
    ) -> usize {
        if au.len() < 2 {
            tracing::warn!(len = au.len(), "access unit too short for a NAL header");
            return 0;
        }

        self.scratch.clear();
        self.scratch.extend_from_slice(au);

        self.header.set_timestamp(Self::rtp_timestamp_for(pts_us));

        let max_payload = self.mtu.saturating_sub(RTP_HEADER_LEN);
        let count = if self.scratch.len() <= max_payload {
            self.write_single_nal_packet();
            emit(&self.out);
            1
        } else {
            self.fragment_into(max_payload, &mut emit)
        };

        tracing::trace!(
            au_len = au.len(),
            fragments = count,
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "access unit packetized"
        );

        count
    }

    /// Convenience wrapper over [`packetize_au_into`](Self::packetize_au_into)
    /// that collects every datagram into an owned `Vec<Vec<u8>>`. Allocates
    /// one vector per datagram; for the per-frame hot path, call
    /// `packetize_au_into` directly with a callback that writes into an
    /// already-owned buffer instead.
    pub fn packetize_au(&mut self, au: &[u8], pts_us: u64) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        self.packetize_au_into(au, pts_us, |packet| packets.push(packet.to_vec()));
        packets
    }

    fn write_single_nal_packet(&mut self) {
        let hdr = self.header.write(true);
        self.out.clear();
        self.out.reserve(RTP_HEADER_LEN + self.scratch.len());
        self.out.extend_from_slice(&hdr);
        self.out.extend_from_slice(&self.scratch);
    }

    /// RFC 7798 §4.4.3 Fragmentation Unit mode.
    fn fragment_into(&mut self, max_payload: usize, emit: &mut impl FnMut(&[u8])) -> usize {
        let h0 = self.scratch[0];
        let h1 = self.scratch[1];
        let original_nal_type = nal_type(h0);

        let payload_hdr0 = (NAL_TYPE_FU << 1) | (h0 & 0x81);
        let payload_hdr1 = h1;

        let max_fragment = max_payload.saturating_sub(FU_PREFIX_LEN).max(1);
        let fragment_bytes_len = self.scratch.len() - 2;

        let mut offset = 0usize;
        let mut first = true;
        let mut count = 0usize;
        while offset < fragment_bytes_len {
            let remaining = fragment_bytes_len - offset;
            let chunk_size = max_fragment.min(remaining);
            let last = chunk_size == remaining;

            let fu_header = ((first as u8) << 7) | ((last as u8) << 6) | original_nal_type;
            let hdr = self.header.write(last);
            let chunk_start = 2 + offset;

            self.out.clear();
            self.out.reserve(RTP_HEADER_LEN + FU_PREFIX_LEN + chunk_size);
            self.out.extend_from_slice(&hdr);
            self.out.push(payload_hdr0);
            self.out.push(payload_hdr1);
            self.out.push(fu_header);
            self.out
                .extend_from_slice(&self.scratch[chunk_start..chunk_start + chunk_size]);
            emit(&self.out);

            offset += chunk_size;
            first = false;
            count += 1;
        }

        count
    }
}
