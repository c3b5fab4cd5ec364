//! Frame Source Adapter (C1) — the encoder-facing sink.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::encoder::AccessUnit;
use crate::paramset::{self, ParameterSets};
use crate::ring::{BufferToken, RingSlot, TokenRing};
use crate::stats::Stats;

/// Bounded busy-spin applied to a keyframe token when the token ring is
/// full, before it is dropped and counted as severe backpressure.
const KEYFRAME_RETRY_SPINS: u32 = 128;

/// Accepts one access unit at a time from the encoder and routes it:
/// codec-config AUs are handed to the [parameter-set extractor](crate::paramset)
/// and never produce RTP; picture AUs are copied into the token ring's
/// backing slot table and offered as a [`BufferToken`] for C3 to consume.
///
/// Not reentrant: a `debug_assert!` on a sentinel guard catches
/// concurrent/reentrant misuse in debug builds, at no cost in release —
/// the contract is a single serialized caller, not a lock.
pub struct FrameSourceAdapter {
    token_ring: Arc<TokenRing>,
    slot_table: Vec<Mutex<RingSlot>>,
    next_slot: Cell<u32>,
    ready: Arc<AtomicBool>,
    stats: Arc<Stats>,
    param_sets: Arc<Mutex<ParameterSets>>,
    in_call: AtomicBool,
}

impl FrameSourceAdapter {
    pub fn new(
        token_ring: Arc<TokenRing>,
        slot_capacity_bytes: usize,
        ready: Arc<AtomicBool>,
        stats: Arc<Stats>,
        param_sets: Arc<Mutex<ParameterSets>>,
    ) -> Self {
        let capacity = token_ring.capacity();
        let slot_table = (0..capacity)
            .map(|_| Mutex::new(RingSlot::with_capacity(slot_capacity_bytes)))
            .collect();
        Self {
            token_ring,
            slot_table,
            next_slot: Cell::new(0),
            ready,
            stats,
            param_sets,
            in_call: AtomicBool::new(false),
        }
    }

    /// Accept one access unit. See `spec.md` §4.1 for the full contract.
    pub fn on_access_unit(&self, au: AccessUnit<'_>) {
        let reentrant = self.in_call.swap(true, Ordering::AcqRel);
        debug_assert!(!reentrant, "FrameSourceAdapter::on_access_unit is not reentrant");

        if au.is_codec_config {
            let sets = paramset::extract(au.data);
            tracing::info!(ready = sets.is_ready(), "codec-config access unit processed");
            *self.param_sets.lock() = sets;
            self.in_call.store(false, Ordering::Release);
            return;
        }

        if !self.ready.load(Ordering::Acquire) {
            self.stats.record_frame_dropped();
            tracing::trace!("access unit dropped: session not READY");
            self.in_call.store(false, Ordering::Release);
            return;
        }

        self.stats.record_encoded_frame(au.is_keyframe);

        if self.try_enqueue(&au) {
            self.in_call.store(false, Ordering::Release);
            return;
        }

        if !au.is_keyframe {
            self.stats.record_frame_dropped();
            tracing::trace!("non-keyframe token dropped: token ring full");
            self.in_call.store(false, Ordering::Release);
            return;
        }

        let mut enqueued = false;
        for _ in 0..KEYFRAME_RETRY_SPINS {
            if self.try_enqueue(&au) {
                enqueued = true;
                break;
            }
            std::hint::spin_loop();
        }
        if !enqueued {
            self.stats.record_frame_dropped();
            tracing::warn!("keyframe token dropped after bounded retry: severe backpressure");
        }
        self.in_call.store(false, Ordering::Release);
    }

    /// Write `au`'s bytes into the next slot and enqueue a token for it,
    /// but only if the token ring currently has room.
    ///
    /// The slot write and the `next_slot` advance both happen only on the
    /// success path, in lockstep with the ring's own internal write index —
    /// both start at zero and advance exactly once per accepted token, so
    /// the physical slot this picks is always one the ring's own full-check
    /// has just certified free of any not-yet-polled token. Writing (or
    /// advancing) unconditionally on every call, win or lose, would let a
    /// dropped token's bytes clobber a slot an older, still-unconsumed
    /// token is pointing at.
    fn try_enqueue(&self, au: &AccessUnit<'_>) -> bool {
        if self.token_ring.len() >= self.slot_table.len() as u64 {
            return false;
        }

        let slot_index = self.next_slot.get();
        {
            let mut slot = self.slot_table[slot_index as usize].lock();
            slot.fill(au.data);
        }
        let token = BufferToken {
            slot_index,
            len: au.data.len() as u32,
            pts_us: au.pts_us,
            is_keyframe: au.is_keyframe,
        };

        match self.token_ring.offer(token) {
            Ok(()) => {
                self.next_slot
                    .set((slot_index + 1) % self.slot_table.len() as u32);
                true
            }
            Err(_) => false,
        }
    }

    /// Read back the bytes referenced by a token, for the consumer side
    /// (C3) to packetize. Returns a clone since the slot is concurrently
    /// reusable once the consumer proceeds past this token.
    ///
    /// Allocates; prefer [`with_slot_bytes`](Self::with_slot_bytes) on any
    /// per-frame path.
    pub fn take_slot_bytes(&self, token: &BufferToken) -> Vec<u8> {
        let slot = self.slot_table[token.slot_index as usize].lock();
        slot.as_slice()[..token.len as usize].to_vec()
    }

    /// Borrow the bytes referenced by a token without copying them. The
    /// slot stays locked only for the duration of `f`, then is immediately
    /// reusable once the consumer proceeds past this token.
    pub fn with_slot_bytes<R>(&self, token: &BufferToken, f: impl FnOnce(&[u8]) -> R) -> R {
        let slot = self.slot_table[token.slot_index as usize].lock();
        f(&slot.as_slice()[..token.len as usize])
    }

    pub fn token_ring(&self) -> &Arc<TokenRing> {
        &self.token_ring
    }
}
