//! # CwPaddleKeyer
//!
//! Iambic CW paddle keyer firmware core.
//!
//! ## Architecture
//!
//! The pipeline is strictly layered; each layer has a single upstream and a
//! small set of observers:
//!
//! - paddle input layer: debounced, microsecond-stamped edge events
//! - lock-free SPSC event queue between ISR and main loop
//! - iambic engine: a pure FSM with memory, squeeze, and Mode B bonus
//! - keying subsystem: drains + ticks, fans out to TX GPIO, sidetone,
//!   timeline ring, and key-state observers
//! - tone generator + audio pump: click-free sinusoid into I2S chunks
//!
//! The engine and tone generator are pure and host-testable; everything
//! hardware-flavoured sits behind the HAL traits.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod hal;
pub mod keying;
pub mod timeline;

pub use audio::{AudioMode, SidetoneConfig, SidetoneService, ToneGenerator, ToneSettings};
pub use config::{DeviceConfig, KeyingPreset};
pub use error::{Error, Result};
pub use hal::{PaddleEvent, PaddleHal, PaddleLine};
pub use keying::{
    Element, EngineConfig, EngineHooks, IambicMode, KeyStateObserver, KeyingSubsystem,
    MemoryMode, PaddleEngine, SqueezeMode,
};
pub use timeline::{EventLogger, EventType, TimelineEvent};
