//! Sidetone service tests against the capture codec: pump cadence, burst
//! envelopes, degraded modes, audio source switching.

use std::sync::{Arc, Mutex};

use cw_paddle_keyer::audio::codec::{FakeCodec, FakeCodecState};
use cw_paddle_keyer::audio::sidetone::SAMPLES_PER_CHUNK;
use cw_paddle_keyer::audio::{AudioMode, SidetoneConfig, SidetoneService, ToneSettings};
use cw_paddle_keyer::Error;

const SAMPLE_RATE: u32 = 48_000;

fn service() -> (SidetoneService, Arc<Mutex<FakeCodecState>>) {
    let sidetone = SidetoneService::new();
    let codec = FakeCodec::new();
    let state = codec.state();
    sidetone
        .initialize(test_config(), Box::new(codec))
        .unwrap();
    (sidetone, state)
}

fn test_config() -> SidetoneConfig {
    SidetoneConfig {
        sample_rate_hz: SAMPLE_RATE,
        tone: ToneSettings {
            sample_rate_hz: SAMPLE_RATE,
            tone_frequency_hz: 600,
            volume_percent: 80,
            fade_in_ms: 8,
            fade_out_ms: 8,
        },
        spawn_pump_task: false,
    }
}

fn pump_ms(sidetone: &SidetoneService, milliseconds: usize) {
    // 256-frame chunks are ~5.3 ms at 48 kHz.
    let samples = milliseconds * SAMPLE_RATE as usize / 1000;
    let chunks = (samples + 255) / 256;
    for _ in 0..chunks {
        sidetone.pump_once().unwrap();
    }
}

#[test]
fn test_pump_idles_until_first_start() {
    let (sidetone, state) = service();
    assert!(sidetone.is_initialized());
    // Not started yet: the pump reports invalid-state and writes nothing.
    assert_eq!(sidetone.pump_once(), Err(Error::InvalidState));
    assert_eq!(state.lock().unwrap().captured_samples(), 0);
}

#[test]
fn test_start_unmutes_and_latches_pumping() {
    let (sidetone, state) = service();
    sidetone.start().unwrap();
    assert!(!state.lock().unwrap().muted);

    pump_ms(&sidetone, 20);
    sidetone.stop();
    pump_ms(&sidetone, 20);
    // Stopped but started-once: chunks keep flowing (silence via envelope).
    assert!(state.lock().unwrap().captured_samples() >= 2 * SAMPLES_PER_CHUNK);
    assert_eq!(sidetone.pump_once(), Ok(()));
}

/// A 100 ms burst at 48 kHz / 600 Hz / 8 ms fades has clean ramps.
#[test]
fn test_tone_burst_has_clean_ramps() {
    let (sidetone, state) = service();
    sidetone.start().unwrap();
    pump_ms(&sidetone, 100);
    sidetone.stop();
    pump_ms(&sidetone, 40);

    let samples = state.lock().unwrap().concatenated();
    let left: Vec<i16> = samples.iter().step_by(2).copied().collect();
    let amplitude = (80 * i16::MAX as i32 / 100) as f32;
    let fade_samples = (SAMPLE_RATE as usize) * 8 / 1000; // 384

    // Head ramps up: quiet at the very start.
    let head_peak = left[..32]
        .iter()
        .map(|s| s.unsigned_abs() as f32)
        .fold(0.0, f32::max);
    assert!(head_peak <= amplitude * 0.2);

    // Steady 600 Hz mid-burst at full amplitude, nothing clipped.
    let mid = &left[fade_samples..fade_samples + 2_000];
    let mid_peak = mid
        .iter()
        .map(|s| s.unsigned_abs() as f32)
        .fold(0.0, f32::max);
    assert!(mid_peak >= amplitude * 0.9);
    assert!(samples
        .iter()
        .all(|s| (s.unsigned_abs() as f32) <= amplitude + 1.0));

    // Mid-burst zero crossings ≈ 2 × 600 per second.
    let crossings = mid
        .windows(2)
        .filter(|pair| (pair[0] >= 0) != (pair[1] >= 0))
        .count();
    let seconds = mid.len() as f32 / SAMPLE_RATE as f32;
    let expected = 2.0 * 600.0 * seconds;
    assert!((crossings as f32 - expected).abs() <= expected * 0.1);

    // Tail ramps down to exact zeros.
    let tail = &left[left.len() - 32..];
    assert!(tail.iter().all(|&s| s == 0));

    // Envelope slope bound: consecutive samples never jump by more than the
    // waveform slope plus one envelope quantum.
    let max_step = left
        .windows(2)
        .map(|pair| (pair[1] as i32 - pair[0] as i32).abs())
        .max()
        .unwrap();
    assert!(max_step < amplitude as i32 / 4, "step {max_step}");
}

/// A stop early in the fade-in reverses the envelope cleanly.
#[test]
fn test_stop_mid_fade_in_decays_monotonically() {
    let (sidetone, state) = service();
    sidetone.start().unwrap();
    // One chunk (~5.3 ms) lands mid-way into the 8 ms fade-in.
    sidetone.pump_once().unwrap();
    sidetone.stop();
    pump_ms(&sidetone, 40);

    let samples = state.lock().unwrap().concatenated();
    let left: Vec<i16> = samples.iter().step_by(2).copied().collect();
    let amplitude = (80 * i16::MAX as i32 / 100) as f32;

    // Peak stays below the full amplitude: the envelope reversed early.
    let peak = left
        .iter()
        .map(|s| s.unsigned_abs() as f32)
        .fold(0.0, f32::max);
    assert!(peak < amplitude * 0.9);

    // And the burst still ends in silence.
    assert!(left[left.len() - 16..].iter().all(|&s| s == 0));
    assert!(!sidetone.is_active());
}

#[test]
fn test_codec_init_failure_degrades_to_silent_mode() {
    let sidetone = SidetoneService::new();
    let codec = FakeCodec::failing_init(Error::Bus);
    sidetone.initialize(test_config(), Box::new(codec)).unwrap();

    // Keying continues: the service claims initialized, start succeeds.
    assert!(sidetone.is_initialized());
    sidetone.start().unwrap();
    // Without a codec the pump idles forever.
    assert_eq!(sidetone.pump_once(), Err(Error::InvalidState));
}

#[test]
fn test_codec_write_failure_surfaces_as_transient() {
    let (sidetone, state) = service();
    sidetone.start().unwrap();
    sidetone.pump_once().unwrap();

    state.lock().unwrap().write_result = Err(Error::Timeout);
    assert_eq!(sidetone.pump_once(), Err(Error::Timeout));

    // Transient: clears on the next attempt.
    state.lock().unwrap().write_result = Ok(());
    assert_eq!(sidetone.pump_once(), Ok(()));
}

#[test]
fn test_audio_mode_switch_resets_stream_only() {
    let (sidetone, _state) = service();
    sidetone.start().unwrap();
    pump_ms(&sidetone, 10);
    assert!(sidetone.is_active());

    sidetone.stream().push_samples(&[1_000; 64]);
    sidetone.set_audio_mode(AudioMode::StreamPlayer);
    assert_eq!(sidetone.audio_mode(), AudioMode::StreamPlayer);
    // Entering RX resets the stream ring...
    assert!(sidetone.stream().is_empty());
    // ...but leaves the tone generator untouched mid-tone.
    assert!(sidetone.is_active());

    // Same-mode switch is a no-op.
    sidetone.stream().push_samples(&[1_000; 4]);
    sidetone.set_audio_mode(AudioMode::StreamPlayer);
    assert_eq!(sidetone.stream().len(), 4);
}

#[test]
fn test_stream_mode_plays_injected_audio_and_pads_silence() {
    let (sidetone, state) = service();
    sidetone.start().unwrap();
    sidetone.set_audio_mode(AudioMode::StreamPlayer);

    // Half a chunk of remote audio; the rest must be zero-padded.
    sidetone.stream().push_samples(&[500; SAMPLES_PER_CHUNK / 2]);
    sidetone.pump_once().unwrap();

    let state = state.lock().unwrap();
    let chunk = state.writes.last().unwrap();
    assert_eq!(chunk.len(), SAMPLES_PER_CHUNK);
    assert!(chunk[..SAMPLES_PER_CHUNK / 2].iter().all(|&s| s == 500));
    assert!(chunk[SAMPLES_PER_CHUNK / 2..].iter().all(|&s| s == 0));
}

#[test]
fn test_reinitialize_matches_fresh_state() {
    let (sidetone, _state) = service();
    sidetone.start().unwrap();
    pump_ms(&sidetone, 10);

    // Initialize; Deinitialize; Initialize == single Initialize.
    sidetone.deinitialize();
    sidetone.deinitialize();
    assert!(!sidetone.is_initialized());

    let codec = FakeCodec::new();
    let state = codec.state();
    sidetone.initialize(test_config(), Box::new(codec)).unwrap();
    assert!(sidetone.is_initialized());
    assert_eq!(sidetone.pump_once(), Err(Error::InvalidState));
    sidetone.start().unwrap();
    sidetone.pump_once().unwrap();
    assert_eq!(state.lock().unwrap().writes.len(), 1);
}

#[test]
fn test_hot_reload_propagates_volume_to_codec() {
    let (sidetone, state) = service();
    sidetone.set_volume(25);
    assert_eq!(state.lock().unwrap().volume_percent, 25);
    sidetone.set_frequency(700);
    sidetone.set_fade(4, 12);
}
