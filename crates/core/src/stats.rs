//! Publishing statistics.
//!
//! All counters are purely observational — nothing in the pipeline makes a
//! control decision based on their value besides the health predicate — so
//! they use `Ordering::Relaxed` throughout, the same way the pack's
//! `memory_ring.rs` reference counts drops with a plain `AtomicU32`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated from T-encode, T-send, and T-rtsp.
#[derive(Debug, Default)]
pub struct Stats {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    packets_dropped: AtomicU64,
    fragmented_frames: AtomicU64,
    encoded_frames: AtomicU64,
    frames_dropped: AtomicU64,
    keyframes: AtomicU64,
    send_errors: AtomicU64,
    send_would_block: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fragmented_frame(&self) {
        self.fragmented_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoded_frame(&self, is_keyframe: bool) {
        self.encoded_frames.fetch_add(1, Ordering::Relaxed);
        if is_keyframe {
            self.keyframes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A send attempt hit a transient `WouldBlock` and is being retried
    /// against the same datagram, not dropped.
    pub fn record_send_would_block(&self) {
        self.send_would_block.fetch_add(1, Ordering::Relaxed);
    }

    /// Consecutive send errors since the last successful send; callers that
    /// need the "≥10 consecutive" rule track that separately in the sender
    /// worker — this counter is the lifetime total used for the health ratio.
    pub fn send_errors(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Take an immutable snapshot of all counters.
    pub fn snapshot(&self) -> HealthStatus {
        HealthStatus {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            fragmented_frames: self.fragmented_frames.load(Ordering::Relaxed),
            encoded_frames: self.encoded_frames.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            keyframes: self.keyframes.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            send_would_block: self.send_would_block.load(Ordering::Relaxed),
        }
    }

    /// Health predicate: after at least 100 packets, drops stay under 1%
    /// and send errors stay under 0.1% of packets sent.
    pub fn is_healthy(&self) -> bool {
        self.snapshot().is_healthy()
    }
}

/// A point-in-time snapshot of [`Stats`], cheap to log or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthStatus {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_dropped: u64,
    pub fragmented_frames: u64,
    pub encoded_frames: u64,
    pub frames_dropped: u64,
    pub keyframes: u64,
    pub send_errors: u64,
    pub send_would_block: u64,
}

impl HealthStatus {
    /// Total datagrams the pipeline attempted to deliver (sent + dropped).
    pub fn total(&self) -> u64 {
        self.packets_sent + self.packets_dropped
    }

    pub fn is_healthy(&self) -> bool {
        let total = self.total();
        if total < 100 {
            return true;
        }
        let drop_ratio = self.packets_dropped as f64 / total as f64;
        let error_ratio = self.send_errors as f64 / total as f64;
        drop_ratio < 0.01 && error_ratio < 0.001
    }
}
