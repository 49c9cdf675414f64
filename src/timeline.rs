//! Timeline event ring buffer.
//!
//! Bounded history of paddle edges, keying elements, and engine
//! instrumentation, written from both task and ISR context. Writes never
//! block; on overflow the oldest entry is overwritten and a dropped counter
//! increments. Readers are diagnostic and best-effort.

use spin::Mutex;

/// Timeline event capacity used by the keying subsystem.
///
/// At 80 WPM sustained the keyer produces roughly 13 events/sec, so 1024
/// slots hold over a minute of continuous operation before the ring wraps.
pub const TIMELINE_CAPACITY: usize = 1024;

/// Timeline event discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    PaddleEdge = 0,
    RemoteEvent = 1,
    Diagnostics = 2,
    Audio = 3,
    Keying = 4,
    /// arg0: 0=dit/1=dah window, arg1: 0=closed/1=open
    MemoryWindow = 5,
    /// arg1: 0=released/1=active
    Latch = 6,
    /// arg1: 1=detected
    Squeeze = 7,
    /// arg0: 0=element/1=char/2=word
    GapMarker = 8,
    /// arg0: char code (ASCII)
    DecodedChar = 9,
}

/// A single timeline record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineEvent {
    pub timestamp_us: i64,
    pub event_type: EventType,
    pub arg0: u32,
    pub arg1: u32,
}

impl TimelineEvent {
    pub const fn new(timestamp_us: i64, event_type: EventType, arg0: u32, arg1: u32) -> Self {
        Self {
            timestamp_us,
            event_type,
            arg0,
            arg1,
        }
    }

    /// Zero-initialised placeholder, returned by `latest()` on an empty ring.
    pub const fn empty() -> Self {
        Self {
            timestamp_us: 0,
            event_type: EventType::Diagnostics,
            arg0: 0,
            arg1: 0,
        }
    }
}

impl Default for TimelineEvent {
    fn default() -> Self {
        Self::empty()
    }
}

struct Inner<const CAP: usize> {
    buffer: [TimelineEvent; CAP],
    head: usize,
    count: usize,
    dropped: usize,
}

/// Bounded ring of timeline events.
///
/// The spinlock plays the role the portMUX critical-section pair plays on
/// FreeRTOS: both producers (task and ISR) hold it only for the copy of one
/// record, so the ISR path stays bounded and allocation-free.
pub struct EventLogger<const CAP: usize = TIMELINE_CAPACITY> {
    inner: Mutex<Inner<CAP>>,
}

impl<const CAP: usize> EventLogger<CAP> {
    pub const fn new() -> Self {
        assert!(CAP > 0, "EventLogger capacity must be greater than zero");
        Self {
            inner: Mutex::new(Inner {
                buffer: [TimelineEvent::empty(); CAP],
                head: 0,
                count: 0,
                dropped: 0,
            }),
        }
    }

    /// Push from task context. Never blocks beyond the one-record copy.
    pub fn push(&self, event: TimelineEvent) {
        self.inner.lock().push(event);
    }

    /// Push from ISR context. Same spinlock as `push`; kept as a separate
    /// entry point so call sites document their execution context.
    pub fn push_isr(&self, event: TimelineEvent) {
        self.inner.lock().push(event);
    }

    pub fn size(&self) -> usize {
        self.inner.lock().count
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    pub fn dropped_count(&self) -> usize {
        self.inner.lock().dropped
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.head = 0;
        inner.count = 0;
        inner.dropped = 0;
    }

    /// Visit retained events from oldest to newest.
    pub fn for_each(&self, mut visitor: impl FnMut(&TimelineEvent)) {
        let inner = self.inner.lock();
        let valid = inner.count;
        if valid == 0 {
            return;
        }
        let start = if valid == CAP { inner.head } else { 0 };
        for i in 0..valid {
            let mut index = start + i;
            if index >= CAP {
                index -= CAP;
            }
            visitor(&inner.buffer[index]);
        }
    }

    /// The most recently written event, or a zero-initialised one if empty.
    pub fn latest(&self) -> TimelineEvent {
        let inner = self.inner.lock();
        if inner.count == 0 {
            return TimelineEvent::empty();
        }
        let index = if inner.head > 0 { inner.head - 1 } else { CAP - 1 };
        inner.buffer[index]
    }
}

impl<const CAP: usize> Inner<CAP> {
    fn push(&mut self, event: TimelineEvent) {
        self.buffer[self.head] = event;
        let next_head = self.head + 1;
        self.head = if next_head < CAP { next_head } else { 0 };
        if self.count < CAP {
            self.count += 1;
        } else {
            self.dropped += 1;
        }
    }
}

impl<const CAP: usize> Default for EventLogger<CAP> {
    fn default() -> Self {
        Self::new()
    }
}
