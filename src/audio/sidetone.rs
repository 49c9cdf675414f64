//! Sidetone service: audio pump and codec lifecycle.
//!
//! A background task synthesises 256-frame stereo chunks and writes them to
//! the codec through double-buffered DMA. Once `start` has been called the
//! pump keeps writing (silent) frames even when the tone is logically
//! stopped, so fade-outs complete in real audio and a subsequent start has
//! no click; silence comes from the envelope, never from hardware mute.
//!
//! Codec init failure is non-fatal: the service reports initialized in
//! silent mode and keying continues without audio.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use super::codec::{CodecConfig, CodecDriver};
use super::stream::StreamPlayer;
use super::tone::{ToneGenerator, ToneSettings};
use crate::error::{Error, Result};

/// Frames per codec chunk: 5.3 ms of latency at 48 kHz, 16 ms at 16 kHz.
pub const FRAMES_PER_CHUNK: usize = 256;

/// Stereo output, left == right.
pub const CODEC_CHANNEL_COUNT: usize = 2;

/// Interleaved samples per chunk.
pub const SAMPLES_PER_CHUNK: usize = FRAMES_PER_CHUNK * CODEC_CHANNEL_COUNT;

/// Double buffering for DMA.
const CODEC_BUFFER_COUNT: usize = 2;

/// Delay when the pump has nothing to do (not started, codec absent).
/// Keeps the task responsive to `start` without busy-waiting.
const IDLE_DELAY: Duration = Duration::from_millis(10);

/// Backoff after codec write failures. Shorter than idle so transient I2C
/// bus arbitration recovers quickly, long enough to throttle the log.
const ERROR_DELAY: Duration = Duration::from_millis(5);

/// Audio source feeding the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioMode {
    /// Local sidetone (TX mode)
    ToneGenerator = 0,
    /// Remote audio stream (RX mode)
    StreamPlayer = 1,
}

impl AudioMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AudioMode::StreamPlayer,
            _ => AudioMode::ToneGenerator,
        }
    }
}

/// Thread-safe audio mode selector.
struct ModeSelector {
    mode: AtomicU8,
}

impl ModeSelector {
    const fn new() -> Self {
        Self {
            mode: AtomicU8::new(AudioMode::ToneGenerator as u8),
        }
    }

    fn get(&self) -> AudioMode {
        AudioMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    fn set(&self, mode: AudioMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }
}

/// Sidetone service configuration.
#[derive(Clone, Copy, Debug)]
pub struct SidetoneConfig {
    pub sample_rate_hz: u32,
    pub tone: ToneSettings,
    /// Spawn the background pump task. Host tests disable this and drive
    /// [`SidetoneService::pump_once`] for deterministic chunk counts.
    pub spawn_pump_task: bool,
}

impl Default for SidetoneConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            tone: ToneSettings::default(),
            spawn_pump_task: true,
        }
    }
}

struct PumpState {
    buffers: Box<[[i16; SAMPLES_PER_CHUNK]; CODEC_BUFFER_COUNT]>,
    next_index: usize,
}

struct Shared {
    generator: ToneGenerator,
    stream: StreamPlayer,
    codec: Mutex<Option<Box<dyn CodecDriver>>>,
    /// Latched by the first `start`; the pump stays live from then on.
    audio_started: AtomicBool,
    mode: ModeSelector,
    pump: Mutex<PumpState>,
    running: AtomicBool,
}

impl Shared {
    /// Synthesise one chunk and hand it to the codec.
    fn pump_chunk(&self) -> Result<()> {
        if !self.audio_started.load(Ordering::Acquire) {
            return Err(Error::InvalidState);
        }

        let mut pump = self.pump.lock().unwrap();
        let PumpState {
            buffers,
            next_index,
        } = &mut *pump;
        let buffer = &mut buffers[*next_index];

        match self.mode.get() {
            AudioMode::ToneGenerator => self.generator.fill(buffer, FRAMES_PER_CHUNK),
            AudioMode::StreamPlayer => {
                // Underruns are zero-filled inside the stream player.
                self.stream.read_stereo_frames(buffer, FRAMES_PER_CHUNK);
            }
        }

        let mut codec = self.codec.lock().unwrap();
        let Some(codec) = codec.as_mut() else {
            return Err(Error::InvalidState);
        };
        codec.write(&buffer[..])?;
        *next_index = (*next_index + 1) % CODEC_BUFFER_COUNT;
        Ok(())
    }
}

/// Sidetone audio service.
pub struct SidetoneService {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl SidetoneService {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                generator: ToneGenerator::new(),
                stream: StreamPlayer::new(),
                codec: Mutex::new(None),
                audio_started: AtomicBool::new(false),
                mode: ModeSelector::new(),
                pump: Mutex::new(PumpState {
                    buffers: Box::new([[0i16; SAMPLES_PER_CHUNK]; CODEC_BUFFER_COUNT]),
                    next_index: 0,
                }),
                running: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Configure generator and codec and start the pump task.
    ///
    /// Re-initialisation tears the previous state down first. A codec init
    /// failure degrades to silent mode (still `Ok`); a pump task creation
    /// failure likewise leaves keying unaffected.
    pub fn initialize(&self, config: SidetoneConfig, mut codec: Box<dyn CodecDriver>) -> Result<()> {
        self.deinitialize();

        let mut tone = config.tone;
        tone.sample_rate_hz = config.sample_rate_hz;
        self.shared.generator.configure(tone);

        let codec_config = CodecConfig {
            sample_rate_hz: config.sample_rate_hz,
            initial_volume_percent: tone.volume_percent,
            ..Default::default()
        };
        match codec.initialize(&codec_config) {
            Ok(()) => {
                *self.shared.codec.lock().unwrap() = Some(codec);
            }
            Err(err) => {
                warn!("codec init failed ({err}), sidetone continues in silent mode");
                *self.shared.codec.lock().unwrap() = None;
            }
        }

        if config.spawn_pump_task {
            self.shared.running.store(true, Ordering::Release);
            let shared = self.shared.clone();
            let spawned = std::thread::Builder::new()
                .name("sidetone_loop".into())
                .stack_size(4096)
                .spawn(move || audio_task(shared));
            match spawned {
                Ok(handle) => {
                    *self.task.lock().unwrap() = Some(handle);
                }
                Err(err) => {
                    // No pump means no audio, but keying continues.
                    warn!("failed to create audio task: {err}");
                    self.shared.running.store(false, Ordering::Release);
                }
            }
        }

        self.initialized.store(true, Ordering::Release);
        info!(
            "sidetone service initialized (sample_rate={} Hz, freq={} Hz)",
            config.sample_rate_hz, tone.tone_frequency_hz
        );
        Ok(())
    }

    /// Stop the pump and release the codec. Idempotent.
    pub fn deinitialize(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.task.lock().unwrap().take() {
            let _ = handle.join();
        }

        let mut codec = self.shared.codec.lock().unwrap();
        if let Some(driver) = codec.as_mut() {
            driver.shutdown();
        }
        *codec = None;
        drop(codec);

        self.shared.audio_started.store(false, Ordering::Release);
        self.shared.mode.set(AudioMode::ToneGenerator);
        self.shared.stream.reset();
        self.shared.pump.lock().unwrap().next_index = 0;
        self.initialized.store(false, Ordering::Release);
    }

    /// Begin sounding the tone. Unmutes the codec on first use; from then on
    /// silence is produced by the envelope so there is never a mute click.
    pub fn start(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::InvalidState);
        }

        // Unmute before the generator starts so the hardware transient
        // settles before the fade-in begins.
        if let Some(codec) = self.shared.codec.lock().unwrap().as_mut() {
            if let Err(err) = codec.set_mute(false) {
                warn!("failed to unmute codec ({err})");
            }
        }

        self.shared.generator.start();
        self.shared.audio_started.store(true, Ordering::Release);
        Ok(())
    }

    /// Fade the tone out. The pump keeps running so the fade completes.
    pub fn stop(&self) {
        if !self.is_initialized() {
            return;
        }
        self.shared.generator.stop();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// True while the tone is sounding (including fades).
    pub fn is_active(&self) -> bool {
        self.shared.generator.is_active()
    }

    pub fn set_frequency(&self, frequency_hz: u16) {
        self.shared.generator.set_frequency(frequency_hz);
    }

    pub fn set_volume(&self, volume_percent: u8) {
        self.shared.generator.set_volume(volume_percent);
        if let Some(codec) = self.shared.codec.lock().unwrap().as_mut() {
            if let Err(err) = codec.set_volume(volume_percent) {
                warn!("failed to propagate volume to codec ({err})");
            }
        }
    }

    pub fn set_fade(&self, fade_in_ms: u16, fade_out_ms: u16) {
        self.shared.generator.set_fade(fade_in_ms, fade_out_ms);
    }

    /// Switch between local tone (TX) and remote stream (RX). Entering RX
    /// resets only the stream buffer; the tone generator is untouched.
    pub fn set_audio_mode(&self, mode: AudioMode) {
        if self.shared.mode.get() == mode {
            return;
        }
        info!("switching audio mode to {:?}", mode);
        self.shared.mode.set(mode);
        if mode == AudioMode::StreamPlayer {
            self.shared.stream.reset();
        }
    }

    pub fn audio_mode(&self) -> AudioMode {
        self.shared.mode.get()
    }

    /// Remote audio injection point (network receiver).
    pub fn stream(&self) -> &StreamPlayer {
        &self.shared.stream
    }

    pub const fn frames_per_chunk(&self) -> usize {
        FRAMES_PER_CHUNK
    }

    /// Drive one pump iteration synchronously (tests).
    pub fn pump_once(&self) -> Result<()> {
        self.shared.pump_chunk()
    }
}

impl Default for SidetoneService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SidetoneService {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

fn audio_task(shared: Arc<Shared>) {
    while shared.running.load(Ordering::Acquire) {
        match shared.pump_chunk() {
            Ok(()) => {}
            Err(Error::InvalidState) => std::thread::sleep(IDLE_DELAY),
            Err(err) => {
                warn!("codec write failed: {err}");
                std::thread::sleep(ERROR_DELAY);
            }
        }
    }
}
