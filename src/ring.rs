//! Lock-free ring buffers for thread hand-off.
//!
//! [`SpscRing`] carries feed messages from the ingest thread to the book
//! thread: one producer, one consumer, no locks, no allocation after
//! construction. Capacity is a compile-time power of two and one slot is
//! kept unused so full and empty are distinguishable. The producer's
//! release store of `write_pos` pairs with the consumer's acquire load,
//! so a popped value is always fully written.
//!
//! [`MpscRing`] relaxes the producer side to several threads via CAS slot
//! reservation.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An atomic position on its own cache line, so producer and consumer
/// counters never share one.
#[repr(align(64))]
#[derive(Default)]
struct PaddedCounter(AtomicUsize);

/// Single-producer single-consumer ring of trivially copyable values.
///
/// `C` must be a power of two; the effective capacity is `C - 1`.
pub struct SpscRing<T, const C: usize> {
    write_pos: PaddedCounter,
    read_pos: PaddedCounter,
    slots: Box<[UnsafeCell<T>]>,
}

// One thread pushes, one thread pops; the position protocol makes every
// slot access exclusive. T is Copy, so reads never duplicate ownership.
unsafe impl<T: Copy + Send, const C: usize> Sync for SpscRing<T, C> {}

impl<T: Copy + Default, const C: usize> SpscRing<T, C> {
    const MASK: usize = C - 1;
    const CAPACITY_CHECK: () = assert!(C.is_power_of_two() && C > 1, "capacity must be a power of two");

    pub fn new() -> Self {
        let () = Self::CAPACITY_CHECK;
        Self {
            write_pos: PaddedCounter::default(),
            read_pos: PaddedCounter::default(),
            slots: (0..C).map(|_| UnsafeCell::new(T::default())).collect(),
        }
    }

    /// Producer side. Returns `false` when the ring is full; that is
    /// normal backpressure, not an error.
    #[inline]
    pub fn try_push(&self, item: T) -> bool {
        let write = self.write_pos.0.load(Ordering::Relaxed);
        let next = (write + 1) & Self::MASK;

        if next == self.read_pos.0.load(Ordering::Acquire) {
            return false;
        }

        // Only this producer writes the slot at `write`, and the consumer
        // will not read it until the release store below
        unsafe {
            *self.slots[write].get() = item;
        }
        self.write_pos.0.store(next, Ordering::Release);
        true
    }

    /// Consumer side. Returns `None` when the ring is empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let read = self.read_pos.0.load(Ordering::Relaxed);

        if read == self.write_pos.0.load(Ordering::Acquire) {
            return None;
        }

        let item = unsafe { *self.slots[read].get() };
        self.read_pos.0.store((read + 1) & Self::MASK, Ordering::Release);
        Some(item)
    }

    /// Copy the front value without consuming it. Consumer side only.
    #[inline]
    pub fn peek(&self) -> Option<T> {
        let read = self.read_pos.0.load(Ordering::Relaxed);

        if read == self.write_pos.0.load(Ordering::Acquire) {
            return None;
        }

        Some(unsafe { *self.slots[read].get() })
    }

    /// Approximate number of buffered values; may change during the call.
    #[inline]
    pub fn len(&self) -> usize {
        let write = self.write_pos.0.load(Ordering::Acquire);
        let read = self.read_pos.0.load(Ordering::Acquire);
        (write.wrapping_sub(read).wrapping_add(C)) & Self::MASK
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_pos.0.load(Ordering::Acquire) == self.write_pos.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        let write = self.write_pos.0.load(Ordering::Acquire);
        let read = self.read_pos.0.load(Ordering::Acquire);
        ((write + 1) & Self::MASK) == read
    }

    /// Effective capacity: one slot stays unused.
    #[inline]
    pub const fn capacity() -> usize {
        C - 1
    }

    /// Drop all buffered values. Exclusive access required, hence `&mut`.
    pub fn clear(&mut self) {
        self.write_pos.0.store(0, Ordering::Relaxed);
        self.read_pos.0.store(0, Ordering::Relaxed);
    }
}

impl<T: Copy + Default, const C: usize> Default for SpscRing<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Multi-producer single-consumer variant.
///
/// Producers reserve a slot by CAS on `write_pos`, then write it. Between
/// the reservation and the write there is a publication window: a
/// consumer pacing right behind the producers can observe a reserved but
/// not yet written slot. Callers must tolerate that window; contexts that
/// cannot should use per-slot sequence counters instead.
pub struct MpscRing<T, const C: usize> {
    write_pos: PaddedCounter,
    read_pos: PaddedCounter,
    slots: Box<[UnsafeCell<T>]>,
}

unsafe impl<T: Copy + Send, const C: usize> Sync for MpscRing<T, C> {}

impl<T: Copy + Default, const C: usize> MpscRing<T, C> {
    const MASK: usize = C - 1;
    const CAPACITY_CHECK: () = assert!(C.is_power_of_two() && C > 1, "capacity must be a power of two");

    pub fn new() -> Self {
        let () = Self::CAPACITY_CHECK;
        Self {
            write_pos: PaddedCounter::default(),
            read_pos: PaddedCounter::default(),
            slots: (0..C).map(|_| UnsafeCell::new(T::default())).collect(),
        }
    }

    /// Any producer thread. Returns `false` when full.
    #[inline]
    pub fn try_push(&self, item: T) -> bool {
        let mut write = self.write_pos.0.load(Ordering::Relaxed);

        loop {
            let next = (write + 1) & Self::MASK;

            if next == self.read_pos.0.load(Ordering::Acquire) {
                return false;
            }

            match self.write_pos.0.compare_exchange_weak(
                write,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    // Slot claimed exclusively by the successful CAS
                    unsafe {
                        *self.slots[write].get() = item;
                    }
                    return true;
                }
                Err(observed) => write = observed,
            }
        }
    }

    /// Single consumer thread only.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let read = self.read_pos.0.load(Ordering::Relaxed);

        if read == self.write_pos.0.load(Ordering::Acquire) {
            return None;
        }

        let item = unsafe { *self.slots[read].get() };
        self.read_pos.0.store((read + 1) & Self::MASK, Ordering::Release);
        Some(item)
    }

    #[inline]
    pub fn len(&self) -> usize {
        let write = self.write_pos.0.load(Ordering::Acquire);
        let read = self.read_pos.0.load(Ordering::Acquire);
        (write.wrapping_sub(read).wrapping_add(C)) & Self::MASK
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_pos.0.load(Ordering::Acquire) == self.write_pos.0.load(Ordering::Acquire)
    }

    #[inline]
    pub const fn capacity() -> usize {
        C - 1
    }
}

impl<T: Copy + Default, const C: usize> Default for MpscRing<T, C> {
    fn default() -> Self {
        Self::new()
    }
}
