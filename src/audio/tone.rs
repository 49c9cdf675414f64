//! Sidetone tone generator.
//!
//! Synthesises a stereo (duplicated mono) sine wave from the shared LUT with
//! click-free fade envelopes. Controller calls (`start`, `stop`, setters) and
//! the audio pump share the state behind one mutex; `fill` snapshots under
//! the lock, generates without it, and writes back, so the pump never blocks
//! a controller call for more than the two short lock sections.
//!
//! Stop is cooperative: `stop` sets a pending flag and the generator folds
//! it into the envelope at the next sample, which keeps consecutive samples
//! within one envelope quantum of each other.

use std::sync::Mutex;

use super::lut::{LUT_SIZE, SINE_LUT};

/// Tone generator settings.
#[derive(Clone, Copy, Debug)]
pub struct ToneSettings {
    pub sample_rate_hz: u32,
    pub tone_frequency_hz: u16,
    pub volume_percent: u8,
    pub fade_in_ms: u16,
    pub fade_out_ms: u16,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            // 16 kHz is enough for sidetone; 48 kHz when sharing the codec
            // with remote audio.
            sample_rate_hz: 16_000,
            tone_frequency_hz: 600,
            volume_percent: 70,
            fade_in_ms: 5,
            fade_out_ms: 5,
        }
    }
}

/// Envelope state. `Silent` is the only resting state; the codec keeps
/// pumping zero-gain samples once started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Silent,
    FadeIn,
    Playing,
    FadeOut,
}

struct Inner {
    settings: ToneSettings,
    state: State,
    pending_stop: bool,
    fade_in_samples: usize,
    fade_out_samples: usize,
    fade_position: usize,
    /// Fractional LUT index
    phase: f32,
    /// LUT steps per sample: freq * LUT_SIZE / sample_rate
    phase_step: f32,
    amplitude: i16,
}

impl Inner {
    fn update_phase_step(&mut self) {
        self.phase_step = self.settings.tone_frequency_hz as f32 * LUT_SIZE as f32
            / self.settings.sample_rate_hz as f32;
    }

    fn ms_to_samples(&self, duration_ms: u16) -> usize {
        (self.settings.sample_rate_hz as u64 * duration_ms as u64 / 1000) as usize
    }
}

/// Click-free sine generator.
pub struct ToneGenerator {
    inner: Mutex<Inner>,
}

fn volume_to_amplitude(percent: u8) -> i16 {
    let percent = percent.min(100) as i32;
    (percent * i16::MAX as i32 / 100) as i16
}

impl ToneGenerator {
    pub fn new() -> Self {
        let mut inner = Inner {
            settings: ToneSettings::default(),
            state: State::Silent,
            pending_stop: false,
            fade_in_samples: 0,
            fade_out_samples: 0,
            fade_position: 0,
            phase: 0.0,
            phase_step: 0.0,
            amplitude: 0,
        };
        inner.amplitude = volume_to_amplitude(inner.settings.volume_percent);
        inner.fade_in_samples = inner.ms_to_samples(inner.settings.fade_in_ms);
        inner.fade_out_samples = inner.ms_to_samples(inner.settings.fade_out_ms);
        inner.update_phase_step();
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Replace all settings and return to silence.
    pub fn configure(&self, mut settings: ToneSettings) {
        if settings.sample_rate_hz == 0 {
            settings.sample_rate_hz = 1; // Prevent division by zero in the phase step.
        }
        let mut inner = self.inner.lock().unwrap();
        inner.settings = settings;
        inner.amplitude = volume_to_amplitude(settings.volume_percent);
        inner.pending_stop = false;
        inner.fade_position = 0;
        inner.state = State::Silent;
        inner.phase = 0.0;
        inner.update_phase_step();
        inner.fade_in_samples = inner.ms_to_samples(settings.fade_in_ms);
        inner.fade_out_samples = inner.ms_to_samples(settings.fade_out_ms);
    }

    /// Begin (or keep) sounding the tone.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_stop = false;

        match inner.state {
            State::Silent => {
                // Normal start from silence: reset phase, begin fade-in.
                inner.fade_position = 0;
                inner.phase = 0.0;
                inner.state = if inner.fade_in_samples > 0 {
                    State::FadeIn
                } else {
                    State::Playing
                };
            }
            State::FadeOut => {
                // Reverse the envelope continuously: mirror the current gain
                // onto the equivalent fade-in position.
                if inner.fade_out_samples > 0 && inner.fade_in_samples > 0 {
                    let gain = 1.0 - inner.fade_position as f32 / inner.fade_out_samples as f32;
                    inner.fade_position = (gain * inner.fade_in_samples as f32) as usize;
                } else {
                    inner.fade_position = 0;
                }
                inner.state = if inner.fade_in_samples > 0 {
                    State::FadeIn
                } else {
                    State::Playing
                };
            }
            State::FadeIn => {
                // Deliberate quick retrigger: restart the fade from zero.
                inner.fade_position = 0;
            }
            State::Playing => {
                // Already at full volume; a phase reset would click.
            }
        }
    }

    /// Request fade-out. Folded into the generator loop at the next sample.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::Silent || inner.state == State::FadeOut {
            return;
        }
        inner.pending_stop = true;
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().state != State::Silent
    }

    pub fn set_frequency(&self, frequency_hz: u16) {
        if frequency_hz == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.settings.tone_frequency_hz = frequency_hz;
        inner.update_phase_step();
    }

    pub fn frequency(&self) -> u16 {
        self.inner.lock().unwrap().settings.tone_frequency_hz
    }

    pub fn set_volume(&self, percent: u8) {
        let mut inner = self.inner.lock().unwrap();
        inner.settings.volume_percent = percent;
        inner.amplitude = volume_to_amplitude(percent);
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().unwrap().settings.volume_percent
    }

    pub fn set_fade(&self, fade_in_ms: u16, fade_out_ms: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.settings.fade_in_ms = fade_in_ms;
        inner.settings.fade_out_ms = fade_out_ms;
        inner.fade_in_samples = inner.ms_to_samples(fade_in_ms);
        inner.fade_out_samples = inner.ms_to_samples(fade_out_ms);
    }

    pub fn fade_in_ms(&self) -> u16 {
        self.inner.lock().unwrap().settings.fade_in_ms
    }

    pub fn fade_out_ms(&self) -> u16 {
        self.inner.lock().unwrap().settings.fade_out_ms
    }

    /// Write `frames` interleaved stereo samples (left == right).
    ///
    /// Produces zeros while silent, keeping the phase alive so the next
    /// start has no transient. Safe with `frames == 0`; never panics on a
    /// short buffer (the frame count is clamped to what fits).
    pub fn fill(&self, buffer: &mut [i16], frames: usize) {
        let frames = frames.min(buffer.len() / 2);
        if frames == 0 {
            return;
        }

        // Lock 1: snapshot shared state (~1µs).
        let (
            mut state,
            mut fade_position,
            mut pending_stop,
            fade_in_samples,
            fade_out_samples,
            mut phase,
            phase_step,
            amplitude,
        ) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.state,
                inner.fade_position,
                inner.pending_stop,
                inner.fade_in_samples,
                inner.fade_out_samples,
                inner.phase,
                inner.phase_step,
                inner.amplitude,
            )
        };

        // Generate without the lock; start/stop proceed immediately.
        for idx in 0..frames {
            if pending_stop {
                match state {
                    State::Playing => {
                        state = State::FadeOut;
                        fade_position = 0;
                    }
                    State::FadeIn => {
                        // Mirror the current gain onto the fade-out curve so
                        // the envelope reverses without a step.
                        if fade_out_samples > 0 && fade_in_samples > 0 {
                            let gain = fade_position as f32 / fade_in_samples as f32;
                            fade_position = ((1.0 - gain) * fade_out_samples as f32) as usize;
                        } else {
                            fade_position = 0;
                        }
                        state = State::FadeOut;
                    }
                    _ => {}
                }
                pending_stop = false;
            }

            let gain = match state {
                State::Silent => 0.0,
                State::FadeIn => {
                    if fade_in_samples == 0 {
                        state = State::Playing;
                        1.0
                    } else {
                        let gain = fade_position as f32 / fade_in_samples as f32;
                        if gain >= 1.0 {
                            state = State::Playing;
                            fade_position = 0;
                            1.0
                        } else {
                            fade_position += 1;
                            gain
                        }
                    }
                }
                State::Playing => 1.0,
                State::FadeOut => {
                    if fade_out_samples == 0 {
                        state = State::Silent;
                        0.0
                    } else {
                        let gain = 1.0 - fade_position as f32 / fade_out_samples as f32;
                        if gain <= 0.0 {
                            state = State::Silent;
                            0.0
                        } else {
                            fade_position += 1;
                            gain
                        }
                    }
                }
            };

            let waveform = sample_from_lut(phase);
            let value = convert_to_sample(waveform * amplitude as f32 * gain);
            phase += phase_step;
            if phase >= LUT_SIZE as f32 {
                phase -= LUT_SIZE as f32;
            }

            let base = idx * 2;
            buffer[base] = value;
            buffer[base + 1] = value;
        }

        // Lock 2: write back updated state (~1µs).
        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = state;
            inner.fade_position = fade_position;
            inner.pending_stop = pending_stop;
            inner.phase = phase;
        }
    }
}

impl Default for ToneGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear interpolation between adjacent LUT entries.
fn sample_from_lut(phase_index: f32) -> f32 {
    let mut wrapped = phase_index;
    if wrapped >= LUT_SIZE as f32 || wrapped < 0.0 {
        wrapped = wrapped.rem_euclid(LUT_SIZE as f32);
    }
    let index = wrapped as usize;
    let next_index = (index + 1) % LUT_SIZE;
    let frac = wrapped - index as f32;
    let base = SINE_LUT[index];
    let next = SINE_LUT[next_index];
    base + (next - base) * frac
}

/// Saturate to the i16 sample range.
fn convert_to_sample(value: f32) -> i16 {
    if value > i16::MAX as f32 {
        i16::MAX
    } else if value < i16::MIN as f32 {
        i16::MIN
    } else {
        value as i16
    }
}
