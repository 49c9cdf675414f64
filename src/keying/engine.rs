//! Iambic paddle engine finite state machine.
//!
//! Pure logic: no I/O, no allocation after init, fully testable on host by
//! replaying synthetic `(event, now_us)` sequences. The engine is driven by
//! [`PaddleEngine::on_paddle_event`] and [`PaddleEngine::tick`]; everything
//! it decides is reported through the [`EngineHooks`] passed to those calls.
//!
//! # Iambic Modes
//!
//! - **Mode A**: stops when the paddles are released
//! - **Mode B**: adds one opposite bonus element after a release from squeeze

use heapless::Deque;
use log::{info, warn};

use crate::hal::paddle::{PaddleEvent, PaddleLine};

/// Keying element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element {
    Dit,
    Dah,
}

impl Element {
    /// Get the opposite element.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Element::Dit => Element::Dah,
            Element::Dah => Element::Dit,
        }
    }
}

/// Iambic keyer mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IambicMode {
    /// Mode A: stop when paddles released.
    A,
    /// Mode B: complete current + one bonus element on squeeze release.
    #[default]
    B,
}

/// Which paddles may be memorised during an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemoryMode {
    None,
    DotOnly,
    DahOnly,
    #[default]
    Both,
}

/// When the paddle combo used for decisions is captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SqueezeMode {
    /// Capture at element start (Accukeyer/SuperKeyer state latch).
    #[default]
    Snapshot,
    /// Use the live paddle state at every tick (Curtis-A edge behaviour).
    Live,
}

/// FSM state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    SendDit,
    SendDah,
    IntraElementGap,
}

/// Current paddle combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PaddleCombo {
    None,
    DitOnly,
    DahOnly,
    Both,
}

/// Engine configuration. Out-of-range values are clamped at init with a
/// diagnostic; the engine never enters an undefined state.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Keying speed in words per minute, PARIS timing (5..=60).
    pub speed_wpm: u32,
    pub iambic_mode: IambicMode,
    pub memory_mode: MemoryMode,
    pub squeeze_mode: SqueezeMode,
    /// Memory window opens at this percent of element progress (0..=100).
    pub mem_window_open_pct: f32,
    /// Memory window closes at this percent of element progress (0..=100).
    pub mem_window_close_pct: f32,
    /// L (dash length): 10..=90, dash = (L/10) * dit. L=30 is the 3:1 standard.
    pub timing_l: u8,
    /// S (gap space): 0..=99, gap = (S/50) * dit. S=50 is the 1:1 standard.
    pub timing_s: u8,
    /// P (dit duration): 10..=99, dit = theoretical * (P/50). P=50 is 100%.
    pub timing_p: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed_wpm: 20,
            iambic_mode: IambicMode::B,
            memory_mode: MemoryMode::Both,
            squeeze_mode: SqueezeMode::Snapshot,
            mem_window_open_pct: 60.0,
            mem_window_close_pct: 99.0,
            timing_l: 30,
            timing_s: 50,
            timing_p: 50,
        }
    }
}

impl EngineConfig {
    /// Create config for given WPM with default settings.
    pub fn with_wpm(speed_wpm: u32) -> Self {
        Self {
            speed_wpm,
            ..Default::default()
        }
    }

    /// Clamp every field into its accepted range, warning on adjustments.
    pub fn clamped(mut self) -> Self {
        if !(5..=60).contains(&self.speed_wpm) {
            let clamped = self.speed_wpm.clamp(5, 60);
            warn!("speed_wpm {} out of range, clamped to {}", self.speed_wpm, clamped);
            self.speed_wpm = clamped;
        }
        if !(10..=90).contains(&self.timing_l) {
            let clamped = self.timing_l.clamp(10, 90);
            warn!("timing_l {} out of range, clamped to {}", self.timing_l, clamped);
            self.timing_l = clamped;
        }
        if self.timing_s > 99 {
            warn!("timing_s {} out of range, clamped to 99", self.timing_s);
            self.timing_s = 99;
        }
        if !(10..=99).contains(&self.timing_p) {
            let clamped = self.timing_p.clamp(10, 99);
            warn!("timing_p {} out of range, clamped to {}", self.timing_p, clamped);
            self.timing_p = clamped;
        }
        if !(0.0..=100.0).contains(&self.mem_window_open_pct) {
            let clamped = self.mem_window_open_pct.clamp(0.0, 100.0);
            warn!(
                "mem_window_open_pct {} out of range, clamped to {}",
                self.mem_window_open_pct, clamped
            );
            self.mem_window_open_pct = clamped;
        }
        if !(0.0..=100.0).contains(&self.mem_window_close_pct) {
            let clamped = self.mem_window_close_pct.clamp(0.0, 100.0);
            warn!(
                "mem_window_close_pct {} out of range, clamped to {}",
                self.mem_window_close_pct, clamped
            );
            self.mem_window_close_pct = clamped;
        }
        if self.mem_window_open_pct > self.mem_window_close_pct {
            warn!(
                "memory window open {} > close {}, collapsing",
                self.mem_window_open_pct, self.mem_window_close_pct
            );
            self.mem_window_open_pct = self.mem_window_close_pct;
        }
        self
    }

    /// Dit duration in microseconds: PARIS base scaled by P.
    #[inline]
    pub fn dit_duration_us(&self) -> i64 {
        (1_200_000 / self.speed_wpm as i64) * self.timing_p as i64 / 50
    }

    /// Dah duration in microseconds: dit scaled by L.
    #[inline]
    pub fn dah_duration_us(&self) -> i64 {
        self.dit_duration_us() * self.timing_l as i64 / 10
    }

    /// Intra-element gap in microseconds: dit scaled by S.
    #[inline]
    pub fn gap_duration_us(&self) -> i64 {
        self.dit_duration_us() * self.timing_s as i64 / 50
    }

    /// Dash ratio implied by L (3.0 for L=30, 4.0 for L=40).
    #[inline]
    pub fn dash_ratio(&self) -> f32 {
        self.timing_l as f32 / 10.0
    }

    /// Effective WPM under the current L/S/P values, PARIS timing.
    ///
    /// PARIS is 10 dits, 4 dahs and 9 intra-element gaps produced by the
    /// engine, plus 4 character gaps (3 units) and 1 word gap (7 units) at
    /// the theoretical dit length.
    pub fn effective_wpm(&self) -> f32 {
        let base = 1_200_000.0 / self.speed_wpm as f32;
        let word_us = 10.0 * self.dit_duration_us() as f32
            + 4.0 * self.dah_duration_us() as f32
            + 9.0 * self.gap_duration_us() as f32
            + (4.0 * 3.0 + 7.0) * base;
        60_000_000.0 / word_us
    }
}

/// Engine event sink.
///
/// The first three methods are the keying surface proper; the rest are
/// timeline instrumentation with no-op defaults, the engine works the same
/// whether or not they are overridden.
pub trait EngineHooks {
    fn element_started(&mut self, element: Element, timestamp_us: i64);
    fn element_finished(&mut self, element: Element, timestamp_us: i64);
    fn key_state_changed(&mut self, active: bool, timestamp_us: i64);

    fn memory_window_changed(&mut self, _is_dah: bool, _opened: bool, _timestamp_us: i64) {}
    fn latch_state_changed(&mut self, _active: bool, _timestamp_us: i64) {}
    fn squeeze_detected(&mut self, _timestamp_us: i64) {}
}

/// No-op sink for callers that only inspect engine state.
pub struct NullHooks;

impl EngineHooks for NullHooks {
    fn element_started(&mut self, _element: Element, _timestamp_us: i64) {}
    fn element_finished(&mut self, _element: Element, _timestamp_us: i64) {}
    fn key_state_changed(&mut self, _active: bool, _timestamp_us: i64) {}
}

/// Element queue depth: two memory slots, the Mode B bonus, and the element
/// currently being decided.
const ELEMENT_QUEUE_DEPTH: usize = 4;

/// Iambic paddle engine.
///
/// # Example
///
/// ```
/// use cw_paddle_keyer::keying::engine::{EngineConfig, NullHooks, PaddleEngine};
/// use cw_paddle_keyer::hal::paddle::{PaddleEvent, PaddleLine};
///
/// let mut engine = PaddleEngine::new(EngineConfig::with_wpm(25));
/// let mut hooks = NullHooks;
///
/// engine.on_paddle_event(
///     &PaddleEvent { line: PaddleLine::Dit, active: true, timestamp_us: 0, raw_level: 0 },
///     &mut hooks,
/// );
/// engine.tick(0, &mut hooks);
/// assert!(engine.is_key_down());
/// ```
pub struct PaddleEngine {
    config: EngineConfig,

    // FSM state
    state: State,
    current_element: Element,
    last_element: Element,

    // Element and gap timing (microseconds)
    element_start_us: i64,
    element_end_us: i64,
    gap_end_us: i64,

    // Live paddle state
    dit_pressed: bool,
    dah_pressed: bool,

    // Element queue for the memory system
    queue: Deque<Element, ELEMENT_QUEUE_DEPTH>,

    // Memory flags (armed by presses inside the memory window)
    dot_requested: bool,
    dah_requested: bool,

    // Squeeze tracking for the Mode B bonus
    squeeze_seen_this_element: bool,
    // Last non-None combo since the previous element boundary; stabilises
    // snapshot decisions across transient releases within one element
    last_valid_combo: PaddleCombo,

    // Window open/close edge tracking for the timeline hooks
    window_open: bool,
    // Snapshot-mode latch currently holding an armed opposite element
    latched: bool,
}

impl PaddleEngine {
    /// Create an engine with the given configuration (clamped).
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: config.clamped(),
            state: State::Idle,
            current_element: Element::Dit,
            // Start with Dah so a first squeeze leads with Dit.
            last_element: Element::Dah,
            element_start_us: 0,
            element_end_us: 0,
            gap_end_us: 0,
            dit_pressed: false,
            dah_pressed: false,
            queue: Deque::new(),
            dot_requested: false,
            dah_requested: false,
            squeeze_seen_this_element: false,
            last_valid_combo: PaddleCombo::None,
            window_open: false,
            latched: false,
        }
    }

    /// Replace the configuration (clamped). Durations of the element in
    /// flight are unchanged; new timings apply from the next element
    /// boundary.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config.clamped();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn speed_wpm(&self) -> u32 {
        self.config.speed_wpm
    }

    /// True while an element is being sent.
    #[inline]
    pub fn is_key_down(&self) -> bool {
        matches!(self.state, State::SendDit | State::SendDah)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Reset to idle, forgetting queued elements and memory.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.element_start_us = 0;
        self.element_end_us = 0;
        self.gap_end_us = 0;
        while self.queue.pop_front().is_some() {}
        self.dot_requested = false;
        self.dah_requested = false;
        self.squeeze_seen_this_element = false;
        self.last_valid_combo = PaddleCombo::None;
        self.window_open = false;
        self.latched = false;
    }

    /// Feed one paddle edge. `PaddleLine::Key` events are not iambic input
    /// and are ignored here; the integration layer routes them directly.
    pub fn on_paddle_event<H: EngineHooks>(&mut self, event: &PaddleEvent, hooks: &mut H) {
        let was_both = self.combo_now() == PaddleCombo::Both;
        match event.line {
            PaddleLine::Dit => self.dit_pressed = event.active,
            PaddleLine::Dah => self.dah_pressed = event.active,
            PaddleLine::Key => return,
        }

        let combo = self.combo_now();
        if combo != PaddleCombo::None {
            self.last_valid_combo = combo;
        }
        if combo == PaddleCombo::Both && !was_both {
            hooks.squeeze_detected(event.timestamp_us);
            if self.in_element() {
                self.squeeze_seen_this_element = true;
            }
        }

        // Arm memory at event time if the press lands inside the window;
        // tick-time sampling below catches presses that persist into it.
        if event.active && self.in_element() {
            self.arm_memory_if_windowed(event.timestamp_us);
        }
    }

    /// Advance the state machine. Call at >= 1 kHz for accurate
    /// paddle-memory timing.
    pub fn tick<H: EngineHooks>(&mut self, now_us: i64, hooks: &mut H) {
        match self.state {
            State::Idle => {
                if let Some(element) = self.decide_next_element() {
                    self.start_element(element, now_us, hooks);
                }
            }
            State::SendDit | State::SendDah => {
                self.update_memory_window(now_us, hooks);
                if now_us >= self.element_end_us {
                    self.finish_element(hooks);
                }
            }
            State::IntraElementGap => {
                if now_us >= self.gap_end_us {
                    let boundary = self.gap_end_us;
                    self.state = State::Idle;
                    if let Some(element) = self.decide_next_element() {
                        // Start at the nominal boundary so cadence never
                        // drifts with tick jitter.
                        self.start_element(element, boundary, hooks);
                    }
                }
            }
        }
    }

    /// Log the complete FSM status (task context only).
    pub fn dump_state(&self, now_us: i64) {
        info!(
            "engine state={:?} element={:?} last={:?} start={} end={} gap_end={} now={}",
            self.state,
            self.current_element,
            self.last_element,
            self.element_start_us,
            self.element_end_us,
            self.gap_end_us,
            now_us
        );
        info!(
            "paddles dit={} dah={} queue_len={} dot_req={} dah_req={} squeeze={} latched={}",
            self.dit_pressed,
            self.dah_pressed,
            self.queue.len(),
            self.dot_requested,
            self.dah_requested,
            self.squeeze_seen_this_element,
            self.latched
        );
    }

    // --- Private methods ---

    #[inline]
    fn in_element(&self) -> bool {
        matches!(self.state, State::SendDit | State::SendDah)
    }

    #[inline]
    fn combo_now(&self) -> PaddleCombo {
        match (self.dit_pressed, self.dah_pressed) {
            (true, true) => PaddleCombo::Both,
            (true, false) => PaddleCombo::DitOnly,
            (false, true) => PaddleCombo::DahOnly,
            (false, false) => PaddleCombo::None,
        }
    }

    fn memory_allows(&self, element: Element) -> bool {
        match self.config.memory_mode {
            MemoryMode::None => false,
            MemoryMode::DotOnly => element == Element::Dit,
            MemoryMode::DahOnly => element == Element::Dah,
            MemoryMode::Both => true,
        }
    }

    /// Percent of the current element elapsed at `now_us`.
    fn element_progress_pct(&self, now_us: i64) -> f32 {
        let duration = self.element_end_us - self.element_start_us;
        if duration <= 0 {
            return 100.0;
        }
        let elapsed = (now_us - self.element_start_us).clamp(0, duration);
        elapsed as f32 * 100.0 / duration as f32
    }

    /// Window is open iff open < close and progress lies inside. Equal
    /// percents collapse the window to a single instant that never arms.
    fn memory_window_allows(&self, now_us: i64) -> bool {
        let open = self.config.mem_window_open_pct;
        let close = self.config.mem_window_close_pct;
        if open >= close {
            return false;
        }
        let progress = self.element_progress_pct(now_us);
        progress >= open && progress <= close
    }

    /// Arm the opposite memory flag if its paddle is pressed and the window
    /// is open. Re-pressing an already-armed paddle is idempotent.
    fn arm_memory_if_windowed(&mut self, now_us: i64) {
        if !self.memory_window_allows(now_us) {
            return;
        }
        let opposite = self.current_element.opposite();
        let pressed = match opposite {
            Element::Dit => self.dit_pressed,
            Element::Dah => self.dah_pressed,
        };
        if pressed && self.memory_allows(opposite) {
            match opposite {
                Element::Dit => self.dot_requested = true,
                Element::Dah => self.dah_requested = true,
            }
        }
    }

    /// Track window open/close edges for the timeline and sample the
    /// paddles for memory arming.
    fn update_memory_window<H: EngineHooks>(&mut self, now_us: i64, hooks: &mut H) {
        let is_dah_window = self.current_element == Element::Dit;
        let open = self.memory_window_allows(now_us);
        if open != self.window_open {
            self.window_open = open;
            hooks.memory_window_changed(is_dah_window, open, now_us);
        }
        if open {
            self.arm_memory_if_windowed(now_us);
        }
    }

    fn decide_next_element(&mut self) -> Option<Element> {
        // Priority 1: queued elements (memory drained at element finish)
        if let Some(element) = self.queue.pop_front() {
            return Some(element);
        }

        // Priority 2: Mode B bonus after a release from squeeze
        if self.config.iambic_mode == IambicMode::B
            && self.squeeze_seen_this_element
            && self.combo_now() == PaddleCombo::None
        {
            self.squeeze_seen_this_element = false;
            return Some(self.last_element.opposite());
        }

        // Priority 3: current paddle state
        match self.combo_now() {
            PaddleCombo::Both => Some(self.last_element.opposite()),
            PaddleCombo::DitOnly => Some(Element::Dit),
            PaddleCombo::DahOnly => Some(Element::Dah),
            PaddleCombo::None => {
                self.squeeze_seen_this_element = false;
                None
            }
        }
    }

    fn start_element<H: EngineHooks>(&mut self, element: Element, start_us: i64, hooks: &mut H) {
        self.current_element = element;
        self.element_start_us = start_us;
        self.element_end_us = start_us
            + match element {
                Element::Dit => self.config.dit_duration_us(),
                Element::Dah => self.config.dah_duration_us(),
            };
        self.state = match element {
            Element::Dit => State::SendDit,
            Element::Dah => State::SendDah,
        };
        self.window_open = false;
        self.squeeze_seen_this_element = self.combo_now() == PaddleCombo::Both;

        // Snapshot mode latches the combo captured at element start: a
        // squeeze present here arms the opposite memory outright, so the
        // alternation survives a mid-element release.
        if self.config.squeeze_mode == SqueezeMode::Snapshot {
            let snapshot = match self.combo_now() {
                PaddleCombo::None => self.last_valid_combo,
                combo => combo,
            };
            let opposite = element.opposite();
            if snapshot == PaddleCombo::Both && self.memory_allows(opposite) {
                match opposite {
                    Element::Dit => self.dot_requested = true,
                    Element::Dah => self.dah_requested = true,
                }
                if !self.latched {
                    self.latched = true;
                    hooks.latch_state_changed(true, start_us);
                }
            }
        }

        hooks.element_started(element, start_us);
        hooks.key_state_changed(true, start_us);
    }

    fn finish_element<H: EngineHooks>(&mut self, hooks: &mut H) {
        // Timestamps report the nominal element end so timing error never
        // accumulates across elements.
        let end_us = self.element_end_us;

        if self.window_open {
            self.window_open = false;
            let is_dah_window = self.current_element == Element::Dit;
            hooks.memory_window_changed(is_dah_window, false, end_us);
        }

        hooks.element_finished(self.current_element, end_us);
        hooks.key_state_changed(false, end_us);
        self.last_element = self.current_element;
        // The snapshot fallback only stabilises releases within one element:
        // past the boundary the live combo is authoritative again.
        self.last_valid_combo = self.combo_now();

        // Drain memory, opposite element first.
        let (first, second) = match self.current_element {
            Element::Dit => (Element::Dah, Element::Dit),
            Element::Dah => (Element::Dit, Element::Dah),
        };
        for element in [first, second] {
            let flag = match element {
                Element::Dit => &mut self.dot_requested,
                Element::Dah => &mut self.dah_requested,
            };
            if *flag {
                *flag = false;
                let _ = self.queue.push_back(element);
            }
        }

        if self.latched {
            self.latched = false;
            hooks.latch_state_changed(false, end_us);
        }

        self.state = State::IntraElementGap;
        self.gap_end_us = end_us + self.config.gap_duration_us();
    }
}
