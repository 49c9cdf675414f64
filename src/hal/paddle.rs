//! Paddle input layer.
//!
//! Turns pin transitions on up to three lines (dit, dah, straight key) into
//! timestamped [`PaddleEvent`]s, resolving active polarity from the pin
//! configuration. Two delivery modes exist, selected at build time:
//!
//! - **Polling** (default): [`PaddleHal::poll`] samples each configured line
//!   and synthesises an event per level change. The sampling interval is the
//!   natural debounce; hardware that bounces hundreds of edges per contact
//!   cannot overwhelm the event queue this way.
//! - **ISR** (`paddle-isr` feature): the platform layer subscribes an
//!   any-edge interrupt per line and dispatches through the same callback.
//!
//! The callback must be treated as ISR-safe by the receiver: no allocation,
//! no logging, no blocking.

use std::sync::Arc;

use crate::error::{Error, Result};

/// Input line identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PaddleLine {
    Dit = 0,
    Dah = 1,
    /// Straight key input; bypasses the iambic engine.
    Key = 2,
}

/// A single debounced, timestamped edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaddleEvent {
    pub line: PaddleLine,
    /// True iff the contact is pressed (polarity already resolved).
    pub active: bool,
    /// Monotonic microseconds at the moment of the edge.
    pub timestamp_us: i64,
    /// Raw pin level for diagnostics.
    pub raw_level: u32,
}

impl PaddleEvent {
    /// All-zero placeholder used to initialise queue storage.
    pub const EMPTY: Self = Self {
        line: PaddleLine::Dit,
        active: false,
        timestamp_us: 0,
        raw_level: 0,
    };
}

/// Per-line pin configuration.
#[derive(Clone, Copy, Debug)]
pub struct PaddlePinConfig {
    /// GPIO number; negative means not connected.
    pub gpio: i32,
    pub active_low: bool,
    pub pull_up: bool,
    pub pull_down: bool,
}

impl Default for PaddlePinConfig {
    fn default() -> Self {
        Self {
            gpio: -1,
            active_low: true,
            pull_up: true,
            pull_down: false,
        }
    }
}

impl PaddlePinConfig {
    pub fn is_connected(&self) -> bool {
        self.gpio >= 0
    }
}

/// Input layer configuration, one entry per line.
#[derive(Clone, Copy, Debug, Default)]
pub struct PaddleHalConfig {
    pub dit: PaddlePinConfig,
    pub dah: PaddlePinConfig,
    pub key: PaddlePinConfig,
}

/// Raw level reader for one input pin.
///
/// The platform layer supplies implementations: memory-mapped GPIO on the
/// target, stub pins in host tests.
pub trait InputPin: Send {
    /// Raw electrical level, true = high.
    fn level(&self) -> bool;
}

/// Event sink installed at initialisation. Invoked from ISR context in ISR
/// mode, from task context in polling mode; must be ISR-safe either way.
pub type PaddleCallback = Arc<dyn Fn(PaddleEvent) + Send + Sync>;

struct LineState {
    line: PaddleLine,
    config: PaddlePinConfig,
    pin: Box<dyn InputPin>,
    last_level: bool,
}

/// Paddle input layer.
pub struct PaddleHal {
    lines: Vec<LineState>,
    callback: Option<PaddleCallback>,
    initialized: bool,
}

impl PaddleHal {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            callback: None,
            initialized: false,
        }
    }

    /// Configure the input lines and install the event callback.
    ///
    /// `open_pin` maps a connected pin config to a platform pin; lines whose
    /// `gpio` is negative are skipped silently. Double initialisation fails
    /// with [`Error::InvalidState`]; a pin-open failure is fatal for this
    /// component but callers may continue without keying.
    pub fn initialize<F>(
        &mut self,
        config: &PaddleHalConfig,
        mut open_pin: F,
        callback: PaddleCallback,
    ) -> Result<()>
    where
        F: FnMut(&PaddlePinConfig) -> Result<Box<dyn InputPin>>,
    {
        if self.initialized {
            return Err(Error::InvalidState);
        }

        // Build into a local so a mid-loop failure leaves no half-opened
        // lines behind; a retry after a pin-open failure must not double up
        // the lines that succeeded the first time.
        let mut lines = Vec::new();
        let entries = [
            (PaddleLine::Dit, config.dit),
            (PaddleLine::Dah, config.dah),
            (PaddleLine::Key, config.key),
        ];
        for (line, pin_config) in entries {
            if !pin_config.is_connected() {
                continue;
            }
            let pin = open_pin(&pin_config)?;
            // Prime the edge detector so the resting level at boot does not
            // synthesise a spurious event on the first poll.
            let last_level = pin.level();
            lines.push(LineState {
                line,
                config: pin_config,
                pin,
                last_level,
            });
        }

        self.lines = lines;
        self.callback = Some(callback);
        self.initialized = true;
        Ok(())
    }

    /// Sample every configured line and synthesise events for level changes.
    ///
    /// Call at >= 1 kHz from the main loop; the interval doubles as contact
    /// debounce.
    pub fn poll(&mut self, now_us: i64) {
        if !self.initialized {
            return;
        }
        let Some(callback) = self.callback.as_ref() else {
            return;
        };
        for line in &mut self.lines {
            let level = line.pin.level();
            if level == line.last_level {
                continue;
            }
            line.last_level = level;
            callback(PaddleEvent {
                line: line.line,
                active: level != line.config.active_low,
                timestamp_us: now_us,
                raw_level: level as u32,
            });
        }
    }

    /// Detach all lines and return to a clean state. Idempotent.
    pub fn shutdown(&mut self) {
        self.lines.clear();
        self.callback = None;
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn has_configured_pins(&self) -> bool {
        !self.lines.is_empty()
    }
}

impl Default for PaddleHal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct StubPin {
        level: Arc<AtomicBool>,
    }

    impl InputPin for StubPin {
        fn level(&self) -> bool {
            self.level.load(Ordering::Relaxed)
        }
    }

    fn stub_config() -> PaddleHalConfig {
        PaddleHalConfig {
            dit: PaddlePinConfig {
                gpio: 3,
                ..Default::default()
            },
            dah: PaddlePinConfig {
                gpio: 4,
                ..Default::default()
            },
            key: PaddlePinConfig::default(),
        }
    }

    #[test]
    fn test_initialize_skips_unconnected_pins() {
        let mut hal = PaddleHal::new();
        let mut opened = 0;
        let events: Arc<Mutex<Vec<PaddleEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        hal.initialize(
            &stub_config(),
            |_| {
                opened += 1;
                Ok(Box::new(StubPin {
                    level: Arc::new(AtomicBool::new(true)),
                }))
            },
            Arc::new(move |event| sink.lock().unwrap().push(event)),
        )
        .unwrap();
        // key_gpio is -1: only dit and dah are opened.
        assert_eq!(opened, 2);
        assert!(hal.has_configured_pins());
    }

    #[test]
    fn test_double_initialize_rejected() {
        let mut hal = PaddleHal::new();
        let open = |_: &PaddlePinConfig| -> Result<Box<dyn InputPin>> {
            Ok(Box::new(StubPin {
                level: Arc::new(AtomicBool::new(true)),
            }))
        };
        hal.initialize(&stub_config(), open, Arc::new(|_| {})).unwrap();
        let again = hal.initialize(&stub_config(), open, Arc::new(|_| {}));
        assert_eq!(again, Err(Error::InvalidState));
    }

    #[test]
    fn test_poll_resolves_active_low_polarity() {
        let dit_level = Arc::new(AtomicBool::new(true)); // pulled up, released
        let events: Arc<Mutex<Vec<PaddleEvent>>> = Arc::new(Mutex::new(Vec::new()));

        let mut hal = PaddleHal::new();
        let pin_level = dit_level.clone();
        let sink = events.clone();
        hal.initialize(
            &PaddleHalConfig {
                dit: PaddlePinConfig {
                    gpio: 3,
                    ..Default::default()
                },
                ..Default::default()
            },
            move |_| {
                Ok(Box::new(StubPin {
                    level: pin_level.clone(),
                }))
            },
            Arc::new(move |event| sink.lock().unwrap().push(event)),
        )
        .unwrap();

        // No edge yet: resting level was primed at init.
        hal.poll(1_000);
        assert!(events.lock().unwrap().is_empty());

        // Contact closes: line goes low, event is active.
        dit_level.store(false, Ordering::Relaxed);
        hal.poll(2_000);

        // Contact opens again.
        dit_level.store(true, Ordering::Relaxed);
        hal.poll(3_000);

        let seen = events.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].line, PaddleLine::Dit);
        assert!(seen[0].active);
        assert_eq!(seen[0].timestamp_us, 2_000);
        assert_eq!(seen[0].raw_level, 0);
        assert!(!seen[1].active);
        assert_eq!(seen[1].timestamp_us, 3_000);
    }

    #[test]
    fn test_shutdown_idempotent_and_reinitializable() {
        let mut hal = PaddleHal::new();
        let open = |_: &PaddlePinConfig| -> Result<Box<dyn InputPin>> {
            Ok(Box::new(StubPin {
                level: Arc::new(AtomicBool::new(true)),
            }))
        };
        hal.initialize(&stub_config(), open, Arc::new(|_| {})).unwrap();
        hal.shutdown();
        hal.shutdown();
        assert!(!hal.is_initialized());
        // Initialize; Shutdown; Initialize leaves the same observable state.
        hal.initialize(&stub_config(), open, Arc::new(|_| {})).unwrap();
        assert!(hal.is_initialized());
        assert!(hal.has_configured_pins());
    }

    #[test]
    fn test_pin_open_failure_propagates() {
        let mut hal = PaddleHal::new();
        let result = hal.initialize(
            &stub_config(),
            |_| Err(Error::Bus),
            Arc::new(|_| {}),
        );
        assert_eq!(result, Err(Error::Bus));
        assert!(!hal.is_initialized());
        assert!(!hal.has_configured_pins());
    }

    #[test]
    fn test_retry_after_partial_failure_does_not_duplicate_lines() {
        let dit_level = Arc::new(AtomicBool::new(true));
        let events: Arc<Mutex<Vec<PaddleEvent>>> = Arc::new(Mutex::new(Vec::new()));

        let mut hal = PaddleHal::new();

        // First attempt: dit opens, dah fails. Nothing may stick.
        let pin_level = dit_level.clone();
        let result = hal.initialize(
            &stub_config(),
            move |pin_config| {
                if pin_config.gpio == 3 {
                    Ok(Box::new(StubPin {
                        level: pin_level.clone(),
                    }))
                } else {
                    Err(Error::Bus)
                }
            },
            Arc::new(|_| {}),
        );
        assert_eq!(result, Err(Error::Bus));
        assert!(!hal.is_initialized());
        assert!(!hal.has_configured_pins());

        // Retry with both pins healthy.
        let pin_level = dit_level.clone();
        let sink = events.clone();
        hal.initialize(
            &stub_config(),
            move |pin_config| {
                if pin_config.gpio == 3 {
                    Ok(Box::new(StubPin {
                        level: pin_level.clone(),
                    }))
                } else {
                    Ok(Box::new(StubPin {
                        level: Arc::new(AtomicBool::new(true)),
                    }))
                }
            },
            Arc::new(move |event| sink.lock().unwrap().push(event)),
        )
        .unwrap();
        assert!(hal.is_initialized());

        // One physical edge on dit must produce exactly one event.
        dit_level.store(false, Ordering::Relaxed);
        hal.poll(1_000);
        let seen = events.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].line, PaddleLine::Dit);
        assert!(seen[0].active);
    }
}
