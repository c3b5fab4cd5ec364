//! Network transport: the UDP RTP sender (C4).
//!
//! RTSP's TCP signaling connection is owned directly by
//! [`crate::rtsp::client::RtspClient`] rather than a separate transport
//! type — the teacher's `transport::tcp` module is an accept loop serving
//! many inbound connections, which has no counterpart once the crate is a
//! client dialing exactly one peer.

pub mod udp;

pub use udp::UdpSender;
