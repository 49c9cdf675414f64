//! Hardware Abstraction Layer for CwPaddleKeyer.
//!
//! Thin wrappers around GPIO and codec peripherals.
//! Business logic stays in core modules, HAL is just I/O.

pub mod paddle;
pub mod tx;

#[cfg(target_os = "espidf")]
pub mod esp;

pub use paddle::{PaddleEvent, PaddleHal, PaddleHalConfig, PaddleLine, PaddlePinConfig};
pub use tx::TxKey;
