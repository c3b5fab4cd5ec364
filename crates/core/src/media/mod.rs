//! RTP packetization for the H.265 publishing pipeline.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping) — for reordering and loss detection.
//! - **Timestamp** (32-bit) — media clock, 90 kHz for video.
//! - **SSRC** (32-bit) — chosen once per session to identify the sender.
//! - **Marker bit** — set on the last packet of an access unit.
//!
//! ## Codec
//!
//! Only H.265/HEVC (RFC 7798) is implemented — this pipeline publishes a
//! single fixed video track, so there is no multi-codec registry to
//! dispatch through; [`h265::H265Packetizer`] is used directly.

pub mod h265;
pub mod rtp;
