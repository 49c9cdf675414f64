//! Audio subsystem for sidetone and remote audio
//!
//! Architecture:
//! - Tone generator: 1024-entry LUT, fractional phase, fade envelopes
//! - Pump task: 256-frame stereo chunks, double-buffered codec writes
//! - Stream player: SPSC ring for received remote audio (RX mode)
//! - Codec behind a trait: ES8311 on target, capture fake on host

pub mod codec;
pub mod lut;
pub mod sidetone;
pub mod stream;
pub mod tone;

pub use codec::{CodecConfig, CodecDriver, FakeCodec};
pub use lut::{LUT_SIZE, SINE_LUT};
pub use sidetone::{AudioMode, SidetoneConfig, SidetoneService, FRAMES_PER_CHUNK};
pub use stream::StreamPlayer;
pub use tone::{ToneGenerator, ToneSettings};
