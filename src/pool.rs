//! Pooled order store - O(1) slab allocation with cache-line aligned slots.
//!
//! The pool pre-allocates one contiguous region at construction and never
//! touches the system allocator again. A free list is threaded through the
//! `next` link of unused slots, so acquisition pops the head and release
//! pushes it back (LIFO keeps the hottest slot in cache).
//!
//! Two variants: [`OrderPool`] for the single-threaded book, and
//! [`AtomicIndexPool`] for multi-producer adapter scenarios that only need
//! slot reservation.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::order::Order;

/// Cache line size used for slot alignment throughout the crate.
pub const CACHE_LINE_SIZE: usize = 64;

/// Pool slot index - a compressed pointer. 32 bits halve the linkage
/// footprint of raw pointers, doubling cache density.
pub type PoolIndex = u32;

/// Sentinel representing a null/absent index.
pub const NULL_INDEX: PoolIndex = u32::MAX;

/// Pre-allocated slab of [`Order`] slots with O(1) alloc and free.
///
/// Slots are 64-byte aligned, so the stride is a whole number of cache
/// lines and neighbouring records never share a line.
pub struct OrderPool {
    /// Contiguous block of pre-allocated slots
    slots: Vec<Order>,

    /// Head of the free list (index of the first available slot)
    free_head: PoolIndex,

    /// Number of currently allocated slots
    in_use: u32,

    capacity: u32,
}

impl OrderPool {
    /// Create a pool holding up to `capacity` orders.
    ///
    /// # Panics
    /// Panics if `capacity >= u32::MAX` (the top value is the null index).
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "capacity must be below NULL_INDEX");

        let mut slots = vec![Order::empty(); capacity as usize];

        // Thread the free list through every slot's `next` link
        for i in 0..capacity.saturating_sub(1) {
            slots[i as usize].next = i + 1;
        }
        if capacity > 0 {
            slots[(capacity - 1) as usize].next = NULL_INDEX;
        }

        Self {
            slots,
            free_head: if capacity > 0 { 0 } else { NULL_INDEX },
            in_use: 0,
            capacity,
        }
    }

    /// Allocate a slot, or `None` when the pool is exhausted. Callers
    /// translate exhaustion into a rejection; it is never a panic.
    #[inline]
    pub fn alloc(&mut self) -> Option<PoolIndex> {
        if self.free_head == NULL_INDEX {
            return None;
        }

        let index = self.free_head;
        self.free_head = self.slots[index as usize].next;
        self.in_use += 1;

        self.slots[index as usize].next = NULL_INDEX;
        self.slots[index as usize].prev = NULL_INDEX;

        Some(index)
    }

    /// Return a slot to the pool. The slot is reinitialised before reuse.
    ///
    /// The caller must ensure the index was previously allocated and has
    /// not already been freed; double-free is a caller bug.
    #[inline]
    pub fn free(&mut self, index: PoolIndex) {
        debug_assert!(self.owns(index), "index out of bounds");
        debug_assert!(self.in_use > 0, "double free detected");

        self.slots[index as usize].reset();
        self.slots[index as usize].next = self.free_head;
        self.free_head = index;
        self.in_use -= 1;
    }

    /// Whether `index` addresses a slot inside this pool.
    #[inline]
    pub fn owns(&self, index: PoolIndex) -> bool {
        index < self.capacity
    }

    #[inline]
    pub fn get(&self, index: PoolIndex) -> &Order {
        debug_assert!(self.owns(index), "index out of bounds");
        &self.slots[index as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, index: PoolIndex) -> &mut Order {
        debug_assert!(self.owns(index), "index out of bounds");
        &mut self.slots[index as usize]
    }

    /// Number of currently allocated slots.
    #[inline]
    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn available(&self) -> u32 {
        self.capacity - self.in_use
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_head == NULL_INDEX
    }

    /// Drop every allocation and rebuild the free list. Outstanding
    /// indices become invalid.
    pub fn reset(&mut self) {
        for i in 0..self.capacity {
            self.slots[i as usize].reset();
            self.slots[i as usize].next = i + 1;
        }
        if self.capacity > 0 {
            self.slots[(self.capacity - 1) as usize].next = NULL_INDEX;
            self.free_head = 0;
        } else {
            self.free_head = NULL_INDEX;
        }
        self.in_use = 0;
    }

    /// Pre-fault all pages so the hot path never takes a page fault.
    /// Value-preserving volatile rewrite of one word per slot.
    pub fn warm_up(&mut self) {
        for slot in &mut self.slots {
            unsafe {
                let p = &mut slot.timestamp as *mut u64;
                std::ptr::write_volatile(p, std::ptr::read_volatile(p));
            }
        }
    }
}

impl fmt::Debug for OrderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderPool")
            .field("capacity", &self.capacity)
            .field("in_use", &self.in_use)
            .field("free_head", &self.free_head)
            .finish()
    }
}

/// Multi-producer slot reservation pool.
///
/// Hands out indices through a CAS-based free list; the record storage
/// belongs to whoever owns the slab. The book never shares its pool; this
/// variant exists for adapters with several producing threads.
///
/// ABA is not addressed structurally: a released index must not be
/// released again.
pub struct AtomicIndexPool {
    /// Free-list links, one per slot
    next: Box<[AtomicU32]>,

    free_head: AtomicU32,
    in_use: AtomicU32,
    capacity: u32,
}

impl AtomicIndexPool {
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "capacity must be below NULL_INDEX");

        let next: Box<[AtomicU32]> = (0..capacity)
            .map(|i| {
                if i + 1 < capacity {
                    AtomicU32::new(i + 1)
                } else {
                    AtomicU32::new(NULL_INDEX)
                }
            })
            .collect();

        Self {
            next,
            free_head: AtomicU32::new(if capacity > 0 { 0 } else { NULL_INDEX }),
            in_use: AtomicU32::new(0),
            capacity,
        }
    }

    /// Reserve a slot index, or `None` when exhausted.
    pub fn acquire(&self) -> Option<PoolIndex> {
        let mut head = self.free_head.load(Ordering::Acquire);

        while head != NULL_INDEX {
            let next = self.next[head as usize].load(Ordering::Relaxed);
            match self.free_head.compare_exchange_weak(
                head,
                next,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.in_use.fetch_add(1, Ordering::Relaxed);
                    return Some(head);
                }
                Err(observed) => head = observed,
            }
        }

        None
    }

    /// Push a slot index back onto the free list.
    pub fn release(&self, index: PoolIndex) {
        debug_assert!(index < self.capacity, "index out of bounds");

        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            self.next[index as usize].store(head, Ordering::Relaxed);
            match self.free_head.compare_exchange_weak(
                head,
                index,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => head = observed,
            }
        }

        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn owns(&self, index: PoolIndex) -> bool {
        index < self.capacity
    }

    #[inline]
    pub fn in_use(&self) -> u32 {
        self.in_use.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}
