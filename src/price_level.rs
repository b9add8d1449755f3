//! Price level - a FIFO queue of resting orders at one price.
//!
//! The queue is an intrusive doubly-linked list over pool indices: O(1)
//! append at the tail, O(1) pop from the head during matching, and O(1)
//! splice-out from any position on cancel. Iteration order is insertion
//! order, which is the sole definition of time priority.

use crate::pool::{OrderPool, PoolIndex, NULL_INDEX};
use crate::types::{Price, Quantity};

/// All orders resting at a single price, oldest first.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    pub price: Price,
    /// Index of the oldest order (first to match)
    pub head: PoolIndex,
    /// Index of the newest order (last to match)
    pub tail: PoolIndex,
    /// Sum of remaining quantity across the level
    pub total_quantity: Quantity,
    /// Number of orders in the queue
    pub order_count: u32,
}

impl PriceLevel {
    #[inline]
    pub const fn new(price: Price) -> Self {
        Self {
            price,
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_quantity: 0,
            order_count: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.order_count == 0
    }

    /// First order in time priority, or `NULL_INDEX` if empty.
    #[inline]
    pub const fn front(&self) -> PoolIndex {
        self.head
    }

    /// Last order in time priority, or `NULL_INDEX` if empty.
    #[inline]
    pub const fn back(&self) -> PoolIndex {
        self.tail
    }

    /// Append an order at the tail (end of the time-priority queue).
    ///
    /// The order's remaining quantity is added to the level total.
    #[inline]
    pub fn push_back(&mut self, pool: &mut OrderPool, index: PoolIndex) {
        let remaining = pool.get(index).remaining();

        if self.tail == NULL_INDEX {
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
            let order = pool.get_mut(index);
            order.prev = NULL_INDEX;
            order.next = NULL_INDEX;
        } else {
            pool.get_mut(self.tail).next = index;
            let order = pool.get_mut(index);
            order.prev = self.tail;
            order.next = NULL_INDEX;
            self.tail = index;
        }

        self.order_count += 1;
        self.total_quantity += remaining;
    }

    /// Remove and return the head order. The slot is not freed; that is
    /// the caller's job.
    #[inline]
    pub fn pop_front(&mut self, pool: &mut OrderPool) -> Option<PoolIndex> {
        if self.head == NULL_INDEX {
            return None;
        }

        let index = self.head;
        let (next, remaining) = {
            let order = pool.get(index);
            (order.next, order.remaining())
        };

        if next == NULL_INDEX {
            self.head = NULL_INDEX;
            self.tail = NULL_INDEX;
        } else {
            self.head = next;
            pool.get_mut(next).prev = NULL_INDEX;
        }

        self.order_count -= 1;
        self.total_quantity -= remaining;

        let order = pool.get_mut(index);
        order.prev = NULL_INDEX;
        order.next = NULL_INDEX;

        Some(index)
    }

    /// Splice an order out of the queue from any position.
    ///
    /// Returns `true` when the level is now empty. The slot is not freed.
    #[inline]
    pub fn remove(&mut self, pool: &mut OrderPool, index: PoolIndex) -> bool {
        let (prev, next, remaining) = {
            let order = pool.get(index);
            (order.prev, order.next, order.remaining())
        };

        if prev == NULL_INDEX && next == NULL_INDEX {
            // Only order at the level
            debug_assert!(self.head == index && self.tail == index);
            self.head = NULL_INDEX;
            self.tail = NULL_INDEX;
        } else if prev == NULL_INDEX {
            // Removing the head
            debug_assert!(self.head == index);
            self.head = next;
            pool.get_mut(next).prev = NULL_INDEX;
        } else if next == NULL_INDEX {
            // Removing the tail
            debug_assert!(self.tail == index);
            self.tail = prev;
            pool.get_mut(prev).next = NULL_INDEX;
        } else {
            pool.get_mut(prev).next = next;
            pool.get_mut(next).prev = prev;
        }

        self.order_count -= 1;
        self.total_quantity -= remaining;

        let order = pool.get_mut(index);
        order.prev = NULL_INDEX;
        order.next = NULL_INDEX;

        self.order_count == 0
    }

    /// Subtract a partial fill from the level total. Call alongside
    /// `Order::fill`, before any unlink.
    #[inline]
    pub fn reduce_quantity(&mut self, quantity: Quantity) {
        debug_assert!(self.total_quantity >= quantity);
        self.total_quantity -= quantity;
    }
}
