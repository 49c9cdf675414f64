//! Audio codec driver interface.
//!
//! The sidetone service talks to the codec only through [`CodecDriver`]:
//! the real ES8311 over I2C/I2S on the target (`hal::esp`), an in-memory
//! capture driver on the host and in tests.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Codec bring-up parameters.
#[derive(Clone, Copy, Debug)]
pub struct CodecConfig {
    pub sample_rate_hz: u32,
    /// 7-bit ES8311 control address (0x18 << 1 on the wire)
    pub codec_i2c_address: u8,
    pub use_mclk: bool,
    pub initial_volume_percent: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            codec_i2c_address: 0x18,
            use_mclk: false,
            initial_volume_percent: 50,
        }
    }
}

/// Platform codec contract.
///
/// `initialize` must leave the output muted; the service unmutes on the
/// first start and silence is thereafter produced by the envelope, not by
/// hardware mute. `write` blocks until DMA accepts the chunk, bounded by an
/// internal timeout.
pub trait CodecDriver: Send {
    fn initialize(&mut self, config: &CodecConfig) -> Result<()>;
    fn set_mute(&mut self, mute: bool) -> Result<()>;
    fn set_volume(&mut self, volume_percent: u8) -> Result<()>;
    fn write(&mut self, samples: &[i16]) -> Result<()>;
    fn shutdown(&mut self);
}

/// Observable state of a [`FakeCodec`].
///
/// The codec box is consumed by the sidetone service; callers keep the
/// shared state handle to inspect captured audio and inject faults.
pub struct FakeCodecState {
    pub initialized: bool,
    pub muted: bool,
    pub volume_percent: u8,
    /// Every chunk passed to `write`, in order.
    pub writes: Vec<Vec<i16>>,
    /// Result injected for `initialize`.
    pub init_result: Result<()>,
    /// Result injected for subsequent `write` calls.
    pub write_result: Result<()>,
}

impl FakeCodecState {
    /// Total samples captured across all writes.
    pub fn captured_samples(&self) -> usize {
        self.writes.iter().map(Vec::len).sum()
    }

    /// All captured samples concatenated.
    pub fn concatenated(&self) -> Vec<i16> {
        self.writes.iter().flatten().copied().collect()
    }
}

/// In-memory codec capturing every write, for host tests and the demo build.
pub struct FakeCodec {
    state: Arc<Mutex<FakeCodecState>>,
}

impl FakeCodec {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeCodecState {
                initialized: false,
                muted: true,
                volume_percent: 0,
                writes: Vec::new(),
                init_result: Ok(()),
                write_result: Ok(()),
            })),
        }
    }

    pub fn failing_init(error: Error) -> Self {
        let codec = Self::new();
        codec.state.lock().unwrap().init_result = Err(error);
        codec
    }

    /// Shared handle for inspection after the codec box has been consumed.
    pub fn state(&self) -> Arc<Mutex<FakeCodecState>> {
        self.state.clone()
    }
}

impl Default for FakeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecDriver for FakeCodec {
    fn initialize(&mut self, config: &CodecConfig) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.init_result?;
        state.initialized = true;
        state.muted = true;
        state.volume_percent = config.initial_volume_percent;
        Ok(())
    }

    fn set_mute(&mut self, mute: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(Error::InvalidState);
        }
        state.muted = mute;
        Ok(())
    }

    fn set_volume(&mut self, volume_percent: u8) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(Error::InvalidState);
        }
        state.volume_percent = volume_percent.min(100);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(Error::InvalidState);
        }
        state.write_result?;
        state.writes.push(samples.to_vec());
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.initialized = false;
        state.muted = true;
    }
}
