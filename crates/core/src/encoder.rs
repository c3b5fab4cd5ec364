//! The encoder interface consumed by this pipeline (`spec.md` §6).

use crate::error::Result;

/// One encoded access unit, as a borrowed view into the encoder's own
/// buffer — no owned allocation, matching the AU lifecycle rule that the
/// underlying storage is released back to the encoder immediately after
/// the call returns.
#[derive(Debug, Clone, Copy)]
pub struct AccessUnit<'a> {
    pub data: &'a [u8],
    pub pts_us: u64,
    pub is_keyframe: bool,
    pub is_codec_config: bool,
}

/// The narrow seam between an encoder adapter and this pipeline.
///
/// `spec.md` §6 describes this as "a callback surface delivering, per
/// access unit, `(bytes, pts_us, flags)`"; a single-method trait is the
/// idiomatic Rust binding for that narrow, single-caller interface.
/// Implementations must be able to complete `push` without unbounded
/// wait — the pipeline never blocks on the caller and the caller must
/// not block on the pipeline either.
pub trait EncoderSink: Send + Sync {
    fn push(&self, au: AccessUnit<'_>) -> Result<()>;
}
