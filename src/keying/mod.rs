//! Keying component: event queue, iambic engine, PTT, integration shell.

pub mod engine;
pub mod ptt;
pub mod queue;
pub mod subsystem;

pub use engine::{
    Element, EngineConfig, EngineHooks, IambicMode, MemoryMode, PaddleEngine, SqueezeMode,
};
pub use ptt::{PttController, PttState};
pub use queue::{EventQueue, EVENT_QUEUE_CAPACITY};
pub use subsystem::{KeyStateObserver, KeyingSubsystem};
