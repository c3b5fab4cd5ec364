//! Publisher configuration surface.

use crate::media::h265::DEFAULT_MTU;

/// Default RTSP control port (RFC 2326 §1.2 historical default).
pub const DEFAULT_RTSP_PORT: u16 = 8554;
/// Default RTSP stream path.
pub const DEFAULT_STREAM_PATH: &str = "/android";
/// Default local UDP port announced in SETUP.
pub const DEFAULT_CLIENT_RTP_PORT: u16 = 5004;
/// Default encoder-to-sender ring capacity (must be a power of two).
pub const DEFAULT_TOKEN_RING_CAPACITY: usize = 32;
/// Default packetizer-to-UDP ring capacity (must be a power of two).
pub const DEFAULT_DATAGRAM_RING_CAPACITY: usize = 512;
/// Default per-request RTSP timeout.
pub const DEFAULT_RTSP_TIMEOUT_MS: u64 = 5_000;

/// Configuration for one publishing session.
///
/// Mirrors `spec.md` §6's configuration-surface table, plus the SDP
/// origin/session-name fields an RTSP client needs for every ANNOUNCE —
/// these are never hardcoded, they always come from config, the same way
/// the teacher's `ServerConfig` sources its SDP `o=`/`s=` fields.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// RTSP server hostname or IP to publish to.
    pub peer_host: String,
    /// TCP port for RTSP control.
    pub peer_rtsp_port: u16,
    /// Path component of the RTSP URL (e.g. `/android`).
    pub stream_path: String,
    /// Local UDP port announced in SETUP as `client_port`.
    pub client_rtp_port: u16,
    /// Maximum RTP datagram size, header included.
    pub mtu: usize,
    /// Encoder→sender ring capacity. Must be a power of two.
    pub token_ring_capacity: usize,
    /// Packetizer→UDP ring capacity. Must be a power of two.
    pub datagram_ring_capacity: usize,
    /// Fixed SSRC to use, or `None` to randomize per session (RFC 3550 §8.1).
    pub ssrc: Option<u32>,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
    /// Per-RTSP-request timeout.
    pub rtsp_timeout_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            peer_host: "127.0.0.1".to_string(),
            peer_rtsp_port: DEFAULT_RTSP_PORT,
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            client_rtp_port: DEFAULT_CLIENT_RTP_PORT,
            mtu: DEFAULT_MTU,
            token_ring_capacity: DEFAULT_TOKEN_RING_CAPACITY,
            datagram_ring_capacity: DEFAULT_DATAGRAM_RING_CAPACITY,
            ssrc: None,
            sdp_username: "-".to_string(),
            sdp_session_name: "Stream".to_string(),
            rtsp_timeout_ms: DEFAULT_RTSP_TIMEOUT_MS,
        }
    }
}

impl PublisherConfig {
    /// The RTSP URL this config publishes to: `rtsp://<host>:<port><path>`.
    pub fn rtsp_url(&self) -> String {
        format!(
            "rtsp://{}:{}{}",
            self.peer_host, self.peer_rtsp_port, self.stream_path
        )
    }
}
