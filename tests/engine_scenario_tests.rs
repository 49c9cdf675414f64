//! End-to-end paddle engine scenarios, replayed deterministically by feeding
//! synthetic (event, now) sequences at the 1 kHz main-loop cadence.

use cw_paddle_keyer::hal::paddle::{PaddleEvent, PaddleLine};
use cw_paddle_keyer::keying::engine::{
    Element, EngineConfig, EngineHooks, IambicMode, MemoryMode, PaddleEngine, SqueezeMode,
};

#[derive(Default)]
struct Recorder {
    started: Vec<(Element, i64)>,
    finished: Vec<(Element, i64)>,
    key_states: Vec<(bool, i64)>,
    windows: Vec<(bool, bool, i64)>,
    squeezes: Vec<i64>,
}

impl EngineHooks for Recorder {
    fn element_started(&mut self, element: Element, timestamp_us: i64) {
        self.started.push((element, timestamp_us));
    }
    fn element_finished(&mut self, element: Element, timestamp_us: i64) {
        self.finished.push((element, timestamp_us));
    }
    fn key_state_changed(&mut self, active: bool, timestamp_us: i64) {
        self.key_states.push((active, timestamp_us));
    }
    fn memory_window_changed(&mut self, is_dah: bool, opened: bool, timestamp_us: i64) {
        self.windows.push((is_dah, opened, timestamp_us));
    }
    fn squeeze_detected(&mut self, timestamp_us: i64) {
        self.squeezes.push(timestamp_us);
    }
}

struct Harness {
    engine: PaddleEngine,
    recorder: Recorder,
    events: Vec<PaddleEvent>,
    now_us: i64,
}

impl Harness {
    fn new(config: EngineConfig) -> Self {
        Self {
            engine: PaddleEngine::new(config),
            recorder: Recorder::default(),
            events: Vec::new(),
            now_us: 0,
        }
    }

    fn schedule(&mut self, line: PaddleLine, active: bool, at_us: i64) {
        self.events.push(PaddleEvent {
            line,
            active,
            timestamp_us: at_us,
            raw_level: active as u32,
        });
        self.events.sort_by_key(|event| event.timestamp_us);
    }

    /// Run the 1 kHz loop until `until_us`, delivering due events first,
    /// exactly as the keying subsystem drains before ticking.
    fn run_until(&mut self, until_us: i64) {
        while self.now_us <= until_us {
            while let Some(event) = self.events.first().copied() {
                if event.timestamp_us > self.now_us {
                    break;
                }
                self.engine.on_paddle_event(&event, &mut self.recorder);
                self.events.remove(0);
            }
            self.engine.tick(self.now_us, &mut self.recorder);
            self.now_us += 1_000;
        }
    }

    fn elements(&self) -> Vec<Element> {
        self.recorder.started.iter().map(|(element, _)| *element).collect()
    }
}

/// Scenario 1: single dit at 20 WPM, Mode A, no memory.
#[test]
fn test_single_dit_callbacks_and_idle_return() {
    let mut harness = Harness::new(EngineConfig {
        iambic_mode: IambicMode::A,
        memory_mode: MemoryMode::None,
        squeeze_mode: SqueezeMode::Live,
        ..EngineConfig::with_wpm(20)
    });
    harness.schedule(PaddleLine::Dit, true, 1_000);
    harness.schedule(PaddleLine::Dit, false, 70_000);
    harness.run_until(130_000);

    assert_eq!(harness.recorder.started, vec![(Element::Dit, 1_000)]);
    assert_eq!(harness.recorder.finished, vec![(Element::Dit, 61_000)]);
    assert_eq!(
        harness.recorder.key_states,
        vec![(true, 1_000), (false, 61_000)]
    );
    // Back to idle once the gap after the element has elapsed (t=121 000).
    assert!(harness.engine.is_idle());
}

/// Scenario 2: squeeze at 20 WPM produces alternating elements with
/// one-tick timing tolerance.
#[test]
fn test_squeeze_produces_alternating_timed_elements() {
    let mut harness = Harness::new(EngineConfig::with_wpm(20));
    harness.schedule(PaddleLine::Dit, true, 0);
    harness.schedule(PaddleLine::Dah, true, 30_000);
    harness.run_until(1_000_000);

    let elements = harness.elements();
    assert!(elements.len() >= 6, "expected >= 6 elements, got {}", elements.len());
    for pair in elements.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }

    for (index, (element, started)) in harness.recorder.started.iter().enumerate() {
        let (_, finished) = harness.recorder.finished[index];
        let duration = finished - started;
        let nominal = match element {
            Element::Dit => 60_000,
            Element::Dah => 180_000,
        };
        assert!(
            (duration - nominal).abs() <= 1_000,
            "element {index} duration {duration}"
        );
        if index > 0 {
            let (_, previous_finished) = harness.recorder.finished[index - 1];
            let gap = started - previous_finished;
            assert!((gap - 60_000).abs() <= 1_000, "gap before element {index}");
        }
    }
}

/// Scenario 3: Mode B trailing element after a release from squeeze.
#[test]
fn test_mode_b_trailing_element() {
    let mut harness = Harness::new(EngineConfig {
        iambic_mode: IambicMode::B,
        memory_mode: MemoryMode::Both,
        squeeze_mode: SqueezeMode::Live,
        mem_window_open_pct: 60.0,
        mem_window_close_pct: 99.0,
        ..EngineConfig::with_wpm(20)
    });
    harness.schedule(PaddleLine::Dit, true, 0);
    harness.schedule(PaddleLine::Dah, true, 30_000);
    harness.schedule(PaddleLine::Dit, false, 61_000);
    harness.schedule(PaddleLine::Dah, false, 61_000);
    harness.run_until(600_000);

    assert_eq!(harness.elements(), vec![Element::Dit, Element::Dah]);
    assert_eq!(harness.recorder.started[0], (Element::Dit, 0));
    assert_eq!(harness.recorder.finished[0], (Element::Dit, 60_000));
    assert!(harness.engine.is_idle());
}

/// Scenario 4: a press before the memory window opens never arms memory.
#[test]
fn test_press_before_window_is_ignored() {
    let mut harness = Harness::new(EngineConfig {
        iambic_mode: IambicMode::A,
        memory_mode: MemoryMode::Both,
        squeeze_mode: SqueezeMode::Live,
        mem_window_open_pct: 60.0,
        mem_window_close_pct: 99.0,
        ..EngineConfig::with_wpm(20)
    });
    harness.schedule(PaddleLine::Dit, true, 0);
    // 33% progress: before the window opens at 60%.
    harness.schedule(PaddleLine::Dah, true, 20_000);
    harness.schedule(PaddleLine::Dah, false, 25_000);
    harness.schedule(PaddleLine::Dit, false, 50_000);
    harness.run_until(400_000);

    assert_eq!(harness.elements(), vec![Element::Dit]);
    assert_eq!(harness.recorder.finished, vec![(Element::Dit, 60_000)]);
    assert!(harness.engine.is_idle());
}

/// Memory window hooks fire as the window opens and closes.
#[test]
fn test_memory_window_hooks_report_open_close() {
    let mut harness = Harness::new(EngineConfig {
        mem_window_open_pct: 50.0,
        mem_window_close_pct: 80.0,
        ..EngineConfig::with_wpm(20)
    });
    harness.schedule(PaddleLine::Dit, true, 0);
    harness.schedule(PaddleLine::Dit, false, 55_000);
    harness.run_until(200_000);

    // One dit: the dah-side window opened around 30 ms and closed around
    // 48 ms.
    assert!(!harness.recorder.windows.is_empty());
    let (is_dah, opened, opened_at) = harness.recorder.windows[0];
    assert!(is_dah);
    assert!(opened);
    assert!((opened_at - 30_000).abs() <= 1_000);
    let (_, closed, closed_at) = harness.recorder.windows[1];
    assert!(!closed);
    assert!((closed_at - 48_000).abs() <= 1_000);
}

/// Squeeze hook fires on the rising edge of both-pressed.
#[test]
fn test_squeeze_hook_reports_rising_edge() {
    let mut harness = Harness::new(EngineConfig::with_wpm(20));
    harness.schedule(PaddleLine::Dit, true, 0);
    harness.schedule(PaddleLine::Dah, true, 10_000);
    harness.schedule(PaddleLine::Dah, false, 40_000);
    harness.run_until(100_000);

    assert_eq!(harness.recorder.squeezes, vec![10_000]);
}

/// Dah-only memory (V2/V5/V8 style): dit presses never arm.
#[test]
fn test_dah_only_memory_ignores_dit_press() {
    let mut harness = Harness::new(EngineConfig {
        iambic_mode: IambicMode::A,
        memory_mode: MemoryMode::DahOnly,
        squeeze_mode: SqueezeMode::Live,
        mem_window_open_pct: 0.0,
        mem_window_close_pct: 100.0,
        ..EngineConfig::with_wpm(20)
    });
    // Send a dah, tap dit mid-element.
    harness.schedule(PaddleLine::Dah, true, 0);
    harness.schedule(PaddleLine::Dit, true, 90_000);
    harness.schedule(PaddleLine::Dit, false, 110_000);
    harness.schedule(PaddleLine::Dah, false, 150_000);
    harness.run_until(600_000);

    assert_eq!(harness.elements(), vec![Element::Dah]);

    // Symmetric config arms: dit memory against a dah element.
    let mut harness = Harness::new(EngineConfig {
        iambic_mode: IambicMode::A,
        memory_mode: MemoryMode::DotOnly,
        squeeze_mode: SqueezeMode::Live,
        mem_window_open_pct: 0.0,
        mem_window_close_pct: 100.0,
        ..EngineConfig::with_wpm(20)
    });
    harness.schedule(PaddleLine::Dah, true, 0);
    harness.schedule(PaddleLine::Dit, true, 90_000);
    harness.schedule(PaddleLine::Dit, false, 110_000);
    harness.schedule(PaddleLine::Dah, false, 150_000);
    harness.run_until(600_000);

    assert_eq!(harness.elements(), vec![Element::Dah, Element::Dit]);
}

/// L/S/P changes apply at the next element boundary, never mid-element.
#[test]
fn test_lsp_change_applies_at_boundary() {
    let mut harness = Harness::new(EngineConfig {
        iambic_mode: IambicMode::A,
        squeeze_mode: SqueezeMode::Live,
        ..EngineConfig::with_wpm(20)
    });
    harness.schedule(PaddleLine::Dit, true, 0);
    harness.run_until(10_000);

    // Stretch dits to 150% mid-element.
    harness.engine.set_config(EngineConfig {
        iambic_mode: IambicMode::A,
        squeeze_mode: SqueezeMode::Live,
        timing_p: 75,
        ..EngineConfig::with_wpm(20)
    });
    harness.schedule(PaddleLine::Dit, false, 200_000);
    harness.run_until(500_000);

    // First dit keeps its original 60 ms; the second uses the new 90 ms.
    assert_eq!(harness.recorder.finished[0].1 - harness.recorder.started[0].1, 60_000);
    assert_eq!(harness.recorder.finished[1].1 - harness.recorder.started[1].1, 90_000);
}

/// Engine responsiveness at the speed extremes.
#[test]
fn test_extreme_speeds_complete_elements() {
    for (wpm, dit_us) in [(5u32, 240_000i64), (60u32, 20_000i64)] {
        let mut harness = Harness::new(EngineConfig {
            iambic_mode: IambicMode::A,
            memory_mode: MemoryMode::None,
            squeeze_mode: SqueezeMode::Live,
            ..EngineConfig::with_wpm(wpm)
        });
        harness.schedule(PaddleLine::Dit, true, 0);
        harness.schedule(PaddleLine::Dit, false, dit_us / 2);
        harness.run_until(dit_us * 4);

        assert_eq!(harness.recorder.started, vec![(Element::Dit, 0)], "wpm {wpm}");
        assert_eq!(harness.recorder.finished, vec![(Element::Dit, dit_us)], "wpm {wpm}");
        assert!(harness.engine.is_idle(), "wpm {wpm}");
    }
}
