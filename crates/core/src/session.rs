//! Session descriptor — the one-shot publication from T-rtsp to T-encode.

/// Everything downstream components need once `RECORD 200 OK` has been
/// received: the server-assigned session id, the negotiated transport
/// ports, the stream path, and the session's fixed SSRC.
///
/// Absent until `RECORDING`; valid until TEARDOWN or transport failure.
/// Published through a single [`arc_swap::ArcSwapOption`] write by T-rtsp
/// and read with one acquire load per access unit by T-encode — see
/// [`crate::supervisor::Supervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub session_id: String,
    pub peer_rtp_port: u16,
    pub client_rtp_port: u16,
    pub stream_path: String,
    pub ssrc: u32,
}
