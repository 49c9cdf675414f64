//! Keying subsystem: integration shell around the paddle engine.
//!
//! Bridges OS concerns to the pure engine:
//! - the input-layer callback enqueues events on the lock-free queue
//! - the main loop drains the queue into the engine and ticks it
//! - engine callbacks fan out to transmitter keying, sidetone, the timeline
//!   ring, and registered observers (remote stream, decoder, LEDs)
//! - a PTT tail timer holds the transmitter enabled across elements
//!
//! Engine state is owned exclusively by the main task; nothing here is
//! touched from ISR context except the event queue and the timeline ring.

use std::sync::Arc;

use log::info;

use crate::audio::sidetone::SidetoneService;
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::hal::paddle::{PaddleCallback, PaddleHalConfig, PaddleLine, PaddlePinConfig};
use crate::hal::tx::TxKey;
use crate::timeline::{EventLogger, EventType, TimelineEvent, TIMELINE_CAPACITY};

use super::engine::{
    Element, EngineConfig, EngineHooks, MemoryMode, PaddleEngine, SqueezeMode,
};
use super::ptt::PttController;
use super::queue::{EventQueue, EVENT_QUEUE_CAPACITY};

/// Downstream observer of the keying output.
///
/// The remote streaming client, the Morse decoder, and LED diagnostics all
/// attach through this; the keying core never knows what is listening.
/// Observer failures must stay inside the observer.
pub trait KeyStateObserver: Send {
    fn key_state_changed(&mut self, active: bool, timestamp_us: i64);
    fn ptt_changed(&mut self, _active: bool, _timestamp_us: i64) {}
}

/// Fan-out targets for engine callbacks. Split from the subsystem so the
/// engine can borrow it mutably while it is itself a field.
struct Outputs {
    tx: TxKey,
    sidetone: Option<Arc<SidetoneService>>,
    sidetone_enabled: bool,
    observers: Vec<Box<dyn KeyStateObserver>>,
    timeline: Arc<EventLogger<TIMELINE_CAPACITY>>,
    ptt: PttController,
    key_active: bool,
}

impl Outputs {
    fn apply_key(&mut self, active: bool, timestamp_us: i64) {
        if self.key_active == active {
            return;
        }
        self.key_active = active;
        self.tx.set_keyed(active);

        if self.sidetone_enabled {
            if let Some(sidetone) = &self.sidetone {
                if active {
                    // A codec still booting is non-fatal for keying.
                    let _ = sidetone.start();
                } else {
                    sidetone.stop();
                }
            }
        }

        if active {
            if self.ptt.key_down(timestamp_us) {
                self.notify_ptt(true, timestamp_us);
            }
        } else {
            self.ptt.key_up(timestamp_us);
        }

        for observer in &mut self.observers {
            observer.key_state_changed(active, timestamp_us);
        }
    }

    fn tick_ptt(&mut self, now_us: i64) {
        if self.ptt.tick(now_us) {
            self.notify_ptt(false, now_us);
        }
    }

    fn notify_ptt(&mut self, active: bool, timestamp_us: i64) {
        for observer in &mut self.observers {
            observer.ptt_changed(active, timestamp_us);
        }
    }
}

impl EngineHooks for Outputs {
    fn element_started(&mut self, element: Element, timestamp_us: i64) {
        self.timeline.push(TimelineEvent::new(
            timestamp_us,
            EventType::Keying,
            element as u32,
            1,
        ));
    }

    fn element_finished(&mut self, element: Element, timestamp_us: i64) {
        self.timeline.push(TimelineEvent::new(
            timestamp_us,
            EventType::Keying,
            element as u32,
            0,
        ));
    }

    fn key_state_changed(&mut self, active: bool, timestamp_us: i64) {
        self.apply_key(active, timestamp_us);
    }

    fn memory_window_changed(&mut self, is_dah: bool, opened: bool, timestamp_us: i64) {
        self.timeline.push(TimelineEvent::new(
            timestamp_us,
            EventType::MemoryWindow,
            is_dah as u32,
            opened as u32,
        ));
    }

    fn latch_state_changed(&mut self, active: bool, timestamp_us: i64) {
        self.timeline.push(TimelineEvent::new(
            timestamp_us,
            EventType::Latch,
            0,
            active as u32,
        ));
    }

    fn squeeze_detected(&mut self, timestamp_us: i64) {
        self.timeline
            .push(TimelineEvent::new(timestamp_us, EventType::Squeeze, 0, 1));
    }
}

/// Paddle input processing, keying engine, and timeline logging.
pub struct KeyingSubsystem {
    engine: PaddleEngine,
    queue: Arc<EventQueue<EVENT_QUEUE_CAPACITY>>,
    timeline: Arc<EventLogger<TIMELINE_CAPACITY>>,
    outputs: Outputs,
    straight_key_active: bool,
    initialized: bool,
}

impl KeyingSubsystem {
    pub fn new() -> Self {
        let timeline = Arc::new(EventLogger::new());
        Self {
            engine: PaddleEngine::new(EngineConfig::default()),
            queue: Arc::new(EventQueue::new()),
            timeline: timeline.clone(),
            outputs: Outputs {
                tx: TxKey::new(None, true),
                sidetone: None,
                sidetone_enabled: false,
                observers: Vec::new(),
                timeline,
                ptt: PttController::new(200),
                key_active: false,
            },
            straight_key_active: false,
            initialized: false,
        }
    }

    /// Build the engine, wire the outputs, and arm the event queue.
    pub fn initialize(
        &mut self,
        device_config: &DeviceConfig,
        tx: TxKey,
        sidetone: Option<Arc<SidetoneService>>,
    ) -> Result<()> {
        self.engine = PaddleEngine::new(Self::build_engine_config(device_config));
        self.outputs.tx = tx;
        self.outputs.sidetone = sidetone;
        self.outputs.sidetone_enabled = device_config.audio.sidetone_enabled;
        self.outputs.ptt = PttController::new(device_config.remote.ptt_tail_ms);
        self.outputs.key_active = false;
        self.straight_key_active = false;
        self.initialized = true;
        info!(
            "keying subsystem initialized ({}, {} WPM)",
            device_config.keying.preset.label(),
            device_config.keying.speed_wpm
        );
        Ok(())
    }

    /// ISR-safe callback for the paddle input layer: enqueue only.
    pub fn paddle_callback(&self) -> PaddleCallback {
        let queue = self.queue.clone();
        Arc::new(move |event| {
            queue.push(event);
        })
    }

    /// Consume all queued paddle events. Never blocks; call from the main
    /// loop before `tick`.
    pub fn drain_paddle_events(&mut self) {
        while let Some(event) = self.queue.pop() {
            self.timeline.push(TimelineEvent::new(
                event.timestamp_us,
                EventType::PaddleEdge,
                event.line as u32,
                event.active as u32,
            ));
            match event.line {
                PaddleLine::Key => {
                    // Straight key bypasses the iambic engine entirely.
                    if event.active != self.straight_key_active {
                        self.straight_key_active = event.active;
                        self.outputs.apply_key(event.active, event.timestamp_us);
                    }
                }
                _ => self.engine.on_paddle_event(&event, &mut self.outputs),
            }
        }
    }

    /// Advance the engine and the PTT tail. Call at >= 1 kHz.
    pub fn tick(&mut self, now_us: i64) {
        self.engine.tick(now_us, &mut self.outputs);
        self.outputs.tick_ptt(now_us);
    }

    /// Hot-reload runtime-changeable parameters. Pins are not
    /// reconfigurable without reboot. Idempotent.
    pub fn apply_config(&mut self, device_config: &DeviceConfig) {
        self.engine
            .set_config(Self::build_engine_config(device_config));
        self.outputs.sidetone_enabled = device_config.audio.sidetone_enabled;
        self.outputs
            .ptt
            .set_tail_ms(device_config.remote.ptt_tail_ms);
    }

    /// Register a key-state observer (remote stream, decoder, LEDs).
    pub fn add_observer(&mut self, observer: Box<dyn KeyStateObserver>) {
        self.outputs.observers.push(observer);
    }

    /// Measured network latency, added to the PTT tail for remote keying.
    pub fn set_link_latency_ms(&mut self, latency_ms: u32) {
        self.outputs.ptt.set_link_latency_ms(latency_ms);
    }

    /// Paddle events lost to queue overflow. Monotonic.
    pub fn dropped_event_count(&self) -> u32 {
        self.queue.dropped_count()
    }

    pub fn timeline(&self) -> &EventLogger<TIMELINE_CAPACITY> {
        &self.timeline
    }

    pub fn engine(&self) -> &PaddleEngine {
        &self.engine
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_key_active(&self) -> bool {
        self.outputs.key_active
    }

    pub fn is_ptt_active(&self) -> bool {
        self.outputs.ptt.is_on()
    }

    /// Debug: dump the complete engine status (troubleshooting lockups).
    pub fn dump_engine_state(&self, now_us: i64) {
        self.engine.dump_state(now_us);
    }

    /// Map the device config onto the engine parameter set.
    ///
    /// Presets V0..V9 take their behaviour and L/S/P from the (editable)
    /// preset table; Manual uses the top-level fields.
    pub fn build_engine_config(device_config: &DeviceConfig) -> EngineConfig {
        let keying = &device_config.keying;
        match keying.preset.table_index() {
            None => EngineConfig {
                speed_wpm: keying.speed_wpm,
                iambic_mode: keying.manual_iambic_mode,
                memory_mode: memory_mode_from(
                    keying.manual_memory_enable_dit,
                    keying.manual_memory_enable_dah,
                ),
                squeeze_mode: squeeze_mode_from(keying.manual_use_state_latch),
                mem_window_open_pct: keying.memory_open_percent,
                mem_window_close_pct: keying.memory_close_percent,
                timing_l: keying.timing_l,
                timing_s: keying.timing_s,
                timing_p: keying.timing_p,
            },
            Some(index) => {
                let preset = &keying.preset_definitions[index];
                EngineConfig {
                    speed_wpm: keying.speed_wpm,
                    iambic_mode: preset.iambic_mode,
                    memory_mode: memory_mode_from(
                        preset.enable_dit_memory,
                        preset.enable_dah_memory,
                    ),
                    squeeze_mode: squeeze_mode_from(preset.use_state_latch),
                    mem_window_open_pct: preset.memory_open_pct,
                    mem_window_close_pct: preset.memory_close_pct,
                    timing_l: preset.timing_l,
                    timing_s: preset.timing_s,
                    timing_p: preset.timing_p,
                }
            }
        }
    }

    /// Map the device config onto the input-layer pin set, applying
    /// `swap_paddles` so the engine stays oblivious to handedness.
    pub fn build_paddle_hal_config(device_config: &DeviceConfig) -> PaddleHalConfig {
        let pins = &device_config.paddle_pins;
        let (dit_gpio, dah_gpio) = if device_config.keying.swap_paddles {
            (pins.dah_gpio, pins.dit_gpio)
        } else {
            (pins.dit_gpio, pins.dah_gpio)
        };
        let line = |gpio: i32| PaddlePinConfig {
            gpio,
            active_low: pins.paddles_active_low,
            pull_up: pins.use_pullups,
            pull_down: pins.use_pulldowns,
        };
        PaddleHalConfig {
            dit: line(dit_gpio),
            dah: line(dah_gpio),
            key: line(pins.key_gpio),
        }
    }
}

impl Default for KeyingSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

fn memory_mode_from(enable_dit: bool, enable_dah: bool) -> MemoryMode {
    match (enable_dit, enable_dah) {
        (true, true) => MemoryMode::Both,
        (true, false) => MemoryMode::DotOnly,
        (false, true) => MemoryMode::DahOnly,
        (false, false) => MemoryMode::None,
    }
}

fn squeeze_mode_from(use_state_latch: bool) -> SqueezeMode {
    if use_state_latch {
        SqueezeMode::Snapshot
    } else {
        SqueezeMode::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyingPreset;
    use crate::keying::engine::IambicMode;

    #[test]
    fn test_build_engine_config_from_preset() {
        let mut config = DeviceConfig::default();
        config.keying.preset = KeyingPreset::CurtisABoth;
        let engine_config = KeyingSubsystem::build_engine_config(&config);
        assert_eq!(engine_config.iambic_mode, IambicMode::A);
        assert_eq!(engine_config.memory_mode, MemoryMode::Both);
        assert_eq!(engine_config.squeeze_mode, SqueezeMode::Live);
    }

    #[test]
    fn test_build_engine_config_manual_uses_top_level_fields() {
        let mut config = DeviceConfig::default();
        config.keying.preset = KeyingPreset::Manual;
        config.keying.manual_memory_enable_dit = false;
        config.keying.manual_use_state_latch = false;
        config.keying.timing_l = 40;
        let engine_config = KeyingSubsystem::build_engine_config(&config);
        assert_eq!(engine_config.memory_mode, MemoryMode::DahOnly);
        assert_eq!(engine_config.squeeze_mode, SqueezeMode::Live);
        assert_eq!(engine_config.timing_l, 40);
    }

    #[test]
    fn test_build_engine_config_per_preset_override() {
        let mut config = DeviceConfig::default();
        config.keying.preset = KeyingPreset::AccukeyerBoth;
        config.keying.preset_definitions[KeyingPreset::AccukeyerBoth as usize].timing_l = 35;
        // Manual L is ignored for preset modes.
        config.keying.timing_l = 90;
        let engine_config = KeyingSubsystem::build_engine_config(&config);
        assert_eq!(engine_config.timing_l, 35);
    }

    #[test]
    fn test_build_paddle_hal_config_swap() {
        let mut config = DeviceConfig::default();
        config.paddle_pins.dit_gpio = 3;
        config.paddle_pins.dah_gpio = 4;

        let normal = KeyingSubsystem::build_paddle_hal_config(&config);
        assert_eq!((normal.dit.gpio, normal.dah.gpio), (3, 4));

        config.keying.swap_paddles = true;
        let swapped = KeyingSubsystem::build_paddle_hal_config(&config);
        assert_eq!((swapped.dit.gpio, swapped.dah.gpio), (4, 3));
    }
}
