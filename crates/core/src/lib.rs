//! # rtsp_publish — low-latency H.265 RTP publishing pipeline
//!
//! A Rust library that takes H.265/HEVC access units from an encoder and
//! publishes them as RTP over UDP to a remote RTSP server, driving the
//! client side of the ANNOUNCE/RECORD publish handshake (as opposed to
//! the more common DESCRIBE/PLAY playback direction).
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Client-driven OPTIONS/ANNOUNCE/SETUP/RECORD/TEARDOWN |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP | Packet header format, SSRC generation, sequence/timestamp semantics |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Publish-offer generation carried as the ANNOUNCE body |
//! | [RFC 7798](https://tools.ietf.org/html/rfc7798) | H.265 RTP payload | 2-byte NAL header, FU fragmentation, sprop-parameter-sets |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Supervisor   — builds + owns the pipeline│
//! ├──────────────────────────────────────────┤
//! │  FrameSourceAdapter — encoder-facing sink │
//! │  H265Packetizer     — RFC 7798 packetizer │
//! ├──────────────────────────────────────────┤
//! │  RtspClient    — publish handshake        │
//! │  sdp           — ANNOUNCE offer generation│
//! ├──────────────────────────────────────────┤
//! │  UdpSender     — RTP datagram delivery    │
//! │  ring          — lock-free SPSC rings     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use rtsp_publish::{EncoderSink, PublisherConfig, Supervisor};
//!
//! let supervisor = Supervisor::new(PublisherConfig::default()).unwrap();
//! supervisor.start().unwrap();
//!
//! // Push H.265 access units as the encoder produces them — codec-config
//! // units are routed to parameter-set extraction, picture units are
//! // packetized and queued for delivery.
//! // supervisor.push(access_unit).unwrap();
//!
//! supervisor.stop();
//! ```
//!
//! ## Crate layout
//!
//! - [`supervisor`] — [`Supervisor`], the orchestrator that owns every worker thread.
//! - [`frame_source`] — [`frame_source::FrameSourceAdapter`], the encoder-facing sink.
//! - [`encoder`] — [`EncoderSink`] trait and [`AccessUnit`] the encoder side implements against.
//! - [`media`] — H.265 RTP packetization ([`media::h265`]) and the generic RTP header ([`media::rtp`]).
//! - [`paramset`] — VPS/SPS/PPS extraction from a codec-config buffer.
//! - [`nal`] — Annex-B / length-prefixed NAL unit framing.
//! - [`sdp`] — SDP publish-offer generation for ANNOUNCE.
//! - [`rtsp`] — RTSP request/response wire format and the client state machine.
//! - [`transport`] — [`transport::UdpSender`], the outbound RTP datagram sender.
//! - [`ring`] — Lock-free SPSC ring buffers connecting pipeline stages.
//! - [`session`] — [`session::SessionDescriptor`], published once `RECORD 200 OK` is received.
//! - [`config`] — [`PublisherConfig`] and its defaults.
//! - [`stats`] — [`stats::Stats`] counters and the [`stats::HealthStatus`] predicate.
//! - [`error`] — [`PublishError`] enum and [`Result`] alias.

pub mod config;
pub mod encoder;
pub mod error;
pub mod frame_source;
pub mod media;
pub mod nal;
pub mod paramset;
pub mod ring;
pub mod rtsp;
pub mod sdp;
pub mod session;
pub mod stats;
pub mod supervisor;
pub mod transport;

pub use config::PublisherConfig;
pub use encoder::{AccessUnit, EncoderSink};
pub use error::{PublishError, Result};
pub use session::SessionDescriptor;
pub use stats::{HealthStatus, Stats};
pub use supervisor::Supervisor;
