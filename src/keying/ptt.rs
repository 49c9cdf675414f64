//! PTT (Push-To-Talk) tail timer.
//!
//! PTT asserts on the first key-down and holds through the configured tail
//! after the last key-up, so the transmitter does not chatter between
//! elements. For remote operation the measured link latency is added on top
//! of the base tail; local keying never reads it.

/// PTT state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PttState {
    /// Not transmitting (RX mode)
    Off,
    /// Transmitting (TX mode)
    On,
}

/// PTT controller
pub struct PttController {
    state: PttState,
    /// Base tail in microseconds
    tail_us: i64,
    /// Measured link latency added to the tail (remote streaming only)
    link_latency_us: i64,
    /// When the pending release expires
    release_at_us: i64,
    release_pending: bool,
}

impl PttController {
    /// # Arguments
    /// * `tail_ms` - Base tail timeout in milliseconds
    pub fn new(tail_ms: u32) -> Self {
        Self {
            state: PttState::Off,
            tail_us: tail_ms as i64 * 1000,
            link_latency_us: 0,
            release_at_us: 0,
            release_pending: false,
        }
    }

    #[inline]
    pub fn state(&self) -> PttState {
        self.state
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.state == PttState::On
    }

    /// Key went down. Returns true if PTT just asserted.
    #[inline]
    pub fn key_down(&mut self, _timestamp_us: i64) -> bool {
        self.release_pending = false;
        if self.state == PttState::Off {
            self.state = PttState::On;
            return true;
        }
        false
    }

    /// Key went up: start the tail countdown.
    #[inline]
    pub fn key_up(&mut self, timestamp_us: i64) {
        if self.state == PttState::On {
            self.release_at_us = timestamp_us + self.tail_us + self.link_latency_us;
            self.release_pending = true;
        }
    }

    /// Periodic tick. Returns true if PTT just released.
    #[inline]
    pub fn tick(&mut self, now_us: i64) -> bool {
        if self.release_pending && now_us >= self.release_at_us {
            self.release_pending = false;
            self.state = PttState::Off;
            return true;
        }
        false
    }

    /// Update base tail (e.g., when config changes)
    #[inline]
    pub fn set_tail_ms(&mut self, tail_ms: u32) {
        self.tail_us = tail_ms as i64 * 1000;
    }

    /// Update measured link latency (reported by the remote observer)
    #[inline]
    pub fn set_link_latency_ms(&mut self, latency_ms: u32) {
        self.link_latency_us = latency_ms as i64 * 1000;
    }

    /// Force PTT off immediately
    #[inline]
    pub fn force_off(&mut self) {
        self.state = PttState::Off;
        self.release_pending = false;
    }

    /// Reset to initial state
    #[inline]
    pub fn reset(&mut self) {
        self.state = PttState::Off;
        self.release_at_us = 0;
        self.release_pending = false;
    }
}
