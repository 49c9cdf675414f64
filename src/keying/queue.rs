//! Lock-free SPSC paddle event queue.
//!
//! The sole primitive linking ISR and task context in the keying core: the
//! input layer callback pushes, the main loop pops. One atomic head, one
//! atomic tail, no locks, no allocation.
//!
//! Capacity is sized for worst-case contact bounce: mechanical paddles can
//! bounce for 1-10 ms per transition, producing 3-6 events per bounce at the
//! 1 kHz drain rate. 256 slots absorb simultaneous multi-line bounces plus
//! transient scheduler delays.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::hal::paddle::PaddleEvent;

/// Default queue capacity. Must be a power of 2.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Bounded FIFO of paddle events.
///
/// # Safety
///
/// `UnsafeCell` storage is sound here because:
/// - Single producer (input callback), single consumer (main loop)
/// - Producer writes a slot before publishing it via the `Release` store of
///   `tail`; the consumer's `Acquire` load of `tail` observes the write
/// - Consumer frees a slot only via the `Release` store of `head`; the
///   producer's `Acquire` load of `head` observes it
pub struct EventQueue<const N: usize = EVENT_QUEUE_CAPACITY> {
    slots: UnsafeCell<[PaddleEvent; N]>,
    /// Consumer index (monotonically increasing, wraps via mask).
    head: AtomicUsize,
    /// Producer index (monotonically increasing, wraps via mask).
    tail: AtomicUsize,
    /// Events rejected because the queue was full. Monotonic.
    dropped: AtomicU32,
}

// SAFETY: single producer, single consumer, atomic index coordination; no
// slot is read and written concurrently (see struct-level safety notes).
unsafe impl<const N: usize> Sync for EventQueue<N> {}
unsafe impl<const N: usize> Send for EventQueue<N> {}

impl<const N: usize> EventQueue<N> {
    const MASK: usize = N - 1;

    /// Create a new empty queue.
    ///
    /// # Panics
    ///
    /// Panics at compile time if N is not a power of 2.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "Queue size must be power of 2");
        Self {
            slots: UnsafeCell::new([PaddleEvent::EMPTY; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push an event. ISR-safe: O(1), never blocks, never allocates.
    ///
    /// On overflow the **newest** event (this one) is dropped and the
    /// dropped counter increments; events already queued are preserved so
    /// the consumer still observes them in order.
    #[inline]
    pub fn push(&self, event: PaddleEvent) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= N {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        // SAFETY: slot is past head and before the published tail, so the
        // consumer cannot be reading it.
        unsafe {
            (*self.slots.get())[tail & Self::MASK] = event;
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Pop the oldest event, or `None` if the queue is empty.
    #[inline]
    pub fn pop(&self) -> Option<PaddleEvent> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        // SAFETY: slot is before the published tail and at the unpublished
        // head, so the producer cannot be writing it.
        let event = unsafe { (*self.slots.get())[head & Self::MASK] };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(event)
    }

    /// Number of queued events.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(N)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Total events dropped on overflow since creation. Monotonic.
    #[inline]
    pub fn dropped_count(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
