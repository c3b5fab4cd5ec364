//! Lock-free single-producer/single-consumer bounded ring buffer.
//!
//! Exactly one producer calls [`SpscRing::offer`], exactly one consumer
//! calls [`SpscRing::poll`] — concurrent producers or concurrent consumers
//! violate the ring's invariants and are not guarded against (the contract
//! is enforced by construction: each ring is driven by exactly one named
//! thread per `spec.md` §5, not defended at runtime).
//!
//! Capacity must be a power of two so the index-to-slot mapping is a cheap
//! bitmask instead of a modulo. This is a programmer error, not a runtime
//! condition, so a non-power-of-two capacity panics at construction.
//!
//! Memory ordering: the producer's index publish ([`Ordering::Release`] on
//! `write`) must happen-after the slot write; the consumer's index advance
//! ([`Ordering::Release`] on `read`) must happen-after the slot read. Index
//! loads that gate the other side's next step use [`Ordering::Acquire`].

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// A preallocated, power-of-two-capacity SPSC ring over slots of type `T`.
pub struct SpscRing<T> {
    slots: Box<[UnsafeCell<T>]>,
    mask: u64,
    write: AtomicU64,
    read: AtomicU64,
}

// SAFETY: the SPSC contract (exactly one producer thread calling `offer`,
// exactly one consumer thread calling `poll`) ensures no two threads ever
// touch the same slot's `UnsafeCell` at once.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T: Default> SpscRing<T> {
    /// Create a ring with `capacity` preallocated default-valued slots.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > 0 && capacity.is_power_of_two(),
            "ring capacity must be a nonzero power of two, got {capacity}"
        );
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: (capacity - 1) as u64,
            write: AtomicU64::new(0),
            read: AtomicU64::new(0),
        }
    }
}

impl<T> SpscRing<T> {
    /// Create a ring with `capacity` slots built by calling `init` once per
    /// slot, for element types whose `Default` would not preallocate what
    /// the slot actually needs (e.g. [`RingSlot`], whose buffer must start
    /// at its worst-case datagram size, not empty).
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two.
    pub fn new_with(capacity: usize, mut init: impl FnMut() -> T) -> Self {
        assert!(
            capacity > 0 && capacity.is_power_of_two(),
            "ring capacity must be a nonzero power of two, got {capacity}"
        );
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(init()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: (capacity - 1) as u64,
            write: AtomicU64::new(0),
            read: AtomicU64::new(0),
        }
    }

    /// Ring capacity (always a power of two).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Approximate occupancy. Only exact when called from either the
    /// producer or consumer thread; a third-party observer sees a
    /// racy-but-monotonic-ish value, which is fine for statistics only.
    pub fn len(&self) -> u64 {
        self.write
            .load(Ordering::Acquire)
            .wrapping_sub(self.read.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self, write: u64, read: u64) -> bool {
        write.wrapping_sub(read) == self.capacity() as u64
    }

    /// Offer a value to the ring. Returns `false` if the ring is full and
    /// the value was not accepted — the caller still owns `value`.
    ///
    /// Producer-only; never call concurrently from more than one thread.
    pub fn offer(&self, value: T) -> Result<(), T> {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if self.is_full(write, read) {
            return Err(value);
        }
        let idx = (write & self.mask) as usize;
        // SAFETY: single producer; this slot is not in `[read, write)` so
        // the consumer cannot be reading it concurrently.
        unsafe {
            *self.slots[idx].get() = value;
        }
        self.write.store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Take the next value from the ring, or `None` if empty.
    ///
    /// Consumer-only; never call concurrently from more than one thread.
    /// Requires `T: Default` so the vacated slot can be left in a valid
    /// state for its next producer write.
    pub fn poll(&self) -> Option<T>
    where
        T: Default,
    {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        let idx = (read & self.mask) as usize;
        // SAFETY: single consumer; this slot is within `[read, write)` so
        // the producer will not touch it again until `read` advances past it.
        let value = unsafe { std::mem::take(&mut *self.slots[idx].get()) };
        self.read.store(read.wrapping_add(1), Ordering::Release);
        Some(value)
    }
}

/// A token handed from the encoder side to the sender side through the
/// token ring, referencing bytes already copied into a preallocated slot
/// rather than carrying the access unit's bytes itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferToken {
    /// Index into the token ring's backing slot table.
    pub slot_index: u32,
    /// Length of the valid bytes in that slot.
    pub len: u32,
    /// Presentation timestamp, microseconds.
    pub pts_us: u64,
    /// Whether the access unit this token refers to is a keyframe.
    pub is_keyframe: bool,
}

/// A preallocated, reusable byte buffer owned by the ring it sits in.
///
/// Cleared and refilled in place by whichever side currently owns it, so
/// steady-state operation never allocates.
#[derive(Debug, Clone, Default)]
pub struct RingSlot {
    pub buf: Vec<u8>,
    pub len: usize,
}

impl RingSlot {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn fill(&mut self, data: &[u8]) {
        if self.buf.len() < data.len() {
            self.buf.resize(data.len(), 0);
        }
        self.buf[..data.len()].copy_from_slice(data);
        self.len = data.len();
    }
}

/// Encoder→sender ring carrying [`BufferToken`]s.
pub type TokenRing = SpscRing<BufferToken>;
/// Packetizer→UDP ring carrying fully-built RTP datagrams.
pub type DatagramRing = SpscRing<RingSlot>;

impl SpscRing<RingSlot> {
    /// Reserve the next slot for in-place writing, or `None` if the ring is
    /// currently full. Producer-only.
    ///
    /// Unlike [`SpscRing::offer`], the reserved [`RingSlot`] is never moved
    /// or replaced — the caller overwrites its existing buffer in place via
    /// [`ClaimedSlot::slot_mut`], so steady-state operation touches the same
    /// preallocated buffers release after release instead of allocating a
    /// fresh one per datagram.
    pub fn claim(&self) -> Option<ClaimedSlot<'_>> {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if self.is_full(write, read) {
            return None;
        }
        Some(ClaimedSlot { ring: self, write })
    }

    /// Borrow the next occupied slot for in-place reading, or `None` if the
    /// ring is empty. Consumer-only.
    ///
    /// Unlike [`SpscRing::poll`], the slot is not taken and replaced with
    /// `T::default()` — it stays put until the returned [`OccupiedSlot`]
    /// drops, so its buffer survives to be reused by the producer's next
    /// [`claim`](Self::claim).
    pub fn peek(&self) -> Option<OccupiedSlot<'_>> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        Some(OccupiedSlot { ring: self, read })
    }
}

/// A slot reserved by [`SpscRing::claim`], ready to be filled in place and
/// published with [`commit`](Self::commit).
pub struct ClaimedSlot<'a> {
    ring: &'a SpscRing<RingSlot>,
    write: u64,
}

impl<'a> ClaimedSlot<'a> {
    /// The reserved slot's existing buffer, to be overwritten in place.
    pub fn slot_mut(&mut self) -> &mut RingSlot {
        let idx = (self.write & self.ring.mask) as usize;
        // SAFETY: single producer; this slot is not in `[read, write)` so
        // the consumer cannot be reading it concurrently.
        unsafe { &mut *self.ring.slots[idx].get() }
    }

    /// Publish the slot's current contents to the consumer.
    pub fn commit(self) {
        self.ring
            .write
            .store(self.write.wrapping_add(1), Ordering::Release);
    }
}

/// A slot borrowed by [`SpscRing::peek`], to be read in place. Freed for the
/// producer's next [`SpscRing::claim`] on drop — including a retry loop that
/// re-reads [`slot`](Self::slot) without releasing it, for a consumer that
/// needs to attempt the same datagram more than once (e.g. backing off a
/// transient `WouldBlock`) before moving on.
pub struct OccupiedSlot<'a> {
    ring: &'a SpscRing<RingSlot>,
    read: u64,
}

impl<'a> OccupiedSlot<'a> {
    pub fn slot(&self) -> &RingSlot {
        let idx = (self.read & self.ring.mask) as usize;
        // SAFETY: single consumer; this slot is within `[read, write)` so
        // the producer will not touch it again until `read` advances past it.
        unsafe { &*self.ring.slots[idx].get() }
    }
}

impl<'a> Drop for OccupiedSlot<'a> {
    fn drop(&mut self) {
        self.ring
            .read
            .store(self.read.wrapping_add(1), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_capacity_panics() {
        let _: SpscRing<u32> = SpscRing::new(3);
    }

    #[test]
    fn offer_and_poll_preserve_fifo_order() {
        let ring: SpscRing<u32> = SpscRing::new(4);
        assert!(ring.offer(1).is_ok());
        assert!(ring.offer(2).is_ok());
        assert!(ring.offer(3).is_ok());
        assert_eq!(ring.poll(), Some(1));
        assert_eq!(ring.poll(), Some(2));
        assert_eq!(ring.poll(), Some(3));
        assert_eq!(ring.poll(), None);
    }

    #[test]
    fn offer_fails_when_full_never_silently_overwrites() {
        let ring: SpscRing<u32> = SpscRing::new(2);
        assert!(ring.offer(1).is_ok());
        assert!(ring.offer(2).is_ok());
        assert_eq!(ring.offer(3), Err(3));
        assert_eq!(ring.poll(), Some(1));
        assert!(ring.offer(3).is_ok());
        assert_eq!(ring.poll(), Some(2));
        assert_eq!(ring.poll(), Some(3));
    }

    #[test]
    fn len_tracks_occupancy() {
        let ring: SpscRing<u32> = SpscRing::new(8);
        assert_eq!(ring.len(), 0);
        ring.offer(1).unwrap();
        ring.offer(2).unwrap();
        assert_eq!(ring.len(), 2);
        ring.poll();
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn wraps_around_capacity_repeatedly() {
        let ring: SpscRing<u32> = SpscRing::new(4);
        for round in 0..100u32 {
            assert!(ring.offer(round).is_ok());
            assert_eq!(ring.poll(), Some(round));
        }
    }

    #[test]
    fn single_producer_single_consumer_stress_preserves_fifo() {
        let ring = Arc::new(SpscRing::<u64>::new(64));
        let producer_ring = ring.clone();
        const N: u64 = 200_000;

        let producer = thread::spawn(move || {
            let mut next = 0u64;
            while next < N {
                if producer_ring.offer(next).is_ok() {
                    next += 1;
                }
            }
        });

        let mut expected = 0u64;
        while expected < N {
            if let Some(v) = ring.poll() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn ring_slot_fill_and_as_slice() {
        let mut slot = RingSlot::with_capacity(8);
        slot.fill(&[1, 2, 3]);
        assert_eq!(slot.as_slice(), &[1, 2, 3]);
        slot.fill(&[9, 9]);
        assert_eq!(slot.as_slice(), &[9, 9]);
    }

    #[test]
    fn ring_slot_grows_when_data_exceeds_capacity() {
        let mut slot = RingSlot::with_capacity(2);
        slot.fill(&[1, 2, 3, 4, 5]);
        assert_eq!(slot.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn datagram_ring_of_ring_slots_round_trips() {
        let ring: DatagramRing = SpscRing::new(4);
        let mut slot = RingSlot::with_capacity(16);
        slot.fill(&[0xAA, 0xBB]);
        ring.offer(slot).unwrap();
        let out = ring.poll().unwrap();
        assert_eq!(out.as_slice(), &[0xAA, 0xBB]);
    }

    #[test]
    fn new_with_preallocates_every_slot() {
        let ring: DatagramRing = SpscRing::new_with(4, || RingSlot::with_capacity(1400));
        let mut claimed = ring.claim().unwrap();
        assert_eq!(claimed.slot_mut().buf.capacity(), 1400);
    }

    #[test]
    fn claim_fill_commit_then_peek_release_round_trips_without_reallocating() {
        let ring: DatagramRing = SpscRing::new_with(2, || RingSlot::with_capacity(16));

        let mut claimed = ring.claim().unwrap();
        claimed.slot_mut().fill(&[1, 2, 3]);
        claimed.commit();

        let original_capacity;
        {
            let occupied = ring.peek().expect("slot committed above");
            assert_eq!(occupied.slot().as_slice(), &[1, 2, 3]);
            original_capacity = occupied.slot().buf.capacity();
        } // dropped here, releasing the slot

        // Reclaiming the same physical slot must reuse its buffer, not
        // allocate a new one, as long as the new data still fits.
        let mut claimed = ring.claim().unwrap();
        claimed.slot_mut().fill(&[9, 9]);
        assert_eq!(claimed.slot_mut().buf.capacity(), original_capacity);
        claimed.commit();

        let occupied = ring.peek().unwrap();
        assert_eq!(occupied.slot().as_slice(), &[9, 9]);
    }

    #[test]
    fn claim_returns_none_when_full() {
        let ring: DatagramRing = SpscRing::new_with(1, || RingSlot::with_capacity(8));
        let claimed = ring.claim().unwrap();
        assert!(ring.claim().is_none());
        claimed.commit();
        assert!(ring.claim().is_some());
    }

    #[test]
    fn peek_returns_none_when_empty() {
        let ring: DatagramRing = SpscRing::new_with(2, || RingSlot::with_capacity(8));
        assert!(ring.peek().is_none());
    }

    #[test]
    fn token_ring_carries_buffer_tokens() {
        let ring: TokenRing = SpscRing::new(4);
        let token = BufferToken {
            slot_index: 2,
            len: 100,
            pts_us: 33_333,
            is_keyframe: true,
        };
        ring.offer(token).unwrap();
        assert_eq!(ring.poll(), Some(token));
    }

    /// `Op::Offer` pushes the next value from an ever-increasing counter if
    /// accepted; `Op::Poll` checks the polled value (if any) against a
    /// plain-`VecDeque` reference model. Used by the property test below to
    /// drive arbitrary offer/poll interleavings against a single ring.
    #[derive(Debug, Clone, Copy)]
    enum Op {
        Offer,
        Poll,
    }

    fn op_strategy() -> impl proptest::strategy::Strategy<Value = Op> {
        proptest::prop_oneof![
            proptest::prelude::Just(Op::Offer),
            proptest::prelude::Just(Op::Offer),
            proptest::prelude::Just(Op::Poll),
        ]
    }

    proptest::proptest! {
        /// Property 6 (`spec.md` §8): the ring never reports `offer = Ok`
        /// when full, never returns a slot twice from `poll`, and preserves
        /// FIFO order under an arbitrary interleaving of offers and polls —
        /// checked here in a single thread against a `VecDeque` reference
        /// model, complementing the cross-thread stress test above.
        #[test]
        fn arbitrary_offer_poll_sequence_matches_fifo_reference(
            ops in proptest::collection::vec(op_strategy(), 1..500),
        ) {
            let ring: SpscRing<u64> = SpscRing::new(8);
            let mut reference: std::collections::VecDeque<u64> = std::collections::VecDeque::new();
            let mut next_value = 0u64;

            for op in ops {
                match op {
                    Op::Offer => {
                        let accepted = ring.offer(next_value).is_ok();
                        let should_accept = reference.len() < ring.capacity();
                        proptest::prop_assert_eq!(accepted, should_accept);
                        if accepted {
                            reference.push_back(next_value);
                        }
                        next_value += 1;
                    }
                    Op::Poll => {
                        let polled = ring.poll();
                        let expected = reference.pop_front();
                        proptest::prop_assert_eq!(polled, expected);
                    }
                }
            }
        }
    }
}
