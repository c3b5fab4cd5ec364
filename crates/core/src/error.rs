//! Error types for the H.265 RTP publishing pipeline.

use std::fmt;

/// Errors that can occur while driving the publishing pipeline.
///
/// Only session-fatal and construction-time failures are represented here
/// (transient errors never propagate past the component that observed
/// them — ring-full, single-send-would-block, and missing-`server_port`
/// in a SETUP response only increment [`crate::stats::Stats`] counters).
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP response (RFC 2326 §7).
    #[error("RTSP response parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// An RTSP request received a non-2xx status.
    #[error("RTSP request {method} rejected: {status} {reason}")]
    RequestRejected {
        method: &'static str,
        status: u16,
        reason: String,
    },

    /// The handshake reached a state where the next request cannot be sent
    /// (e.g. RECORD attempted before SETUP completed).
    #[error("invalid RTSP client state: {0}")]
    InvalidState(&'static str),

    /// Required codec parameter sets (SPS or PPS) were never observed
    /// before the publish handshake was started.
    #[error("parameter sets not ready: missing {0}")]
    ParameterSetsNotReady(&'static str),

    /// [`crate::supervisor::Supervisor::start`] was called while already running.
    #[error("publisher already running")]
    AlreadyRunning,
}

/// Specific kind of RTSP response parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no status line).
    EmptyResponse,
    /// The status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was present but not a valid non-negative integer.
    InvalidContentLength,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
        }
    }
}

/// Convenience alias for `Result<T, PublishError>`.
pub type Result<T> = std::result::Result<T, PublishError>;
