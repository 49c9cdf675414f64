//! Transmitter keying output.
//!
//! Thin polarity-aware wrapper over the TX GPIO. Owned by the main task
//! only; the keying subsystem drives it from key-state callbacks.

/// Level writer for one output pin.
pub trait OutputPin: Send {
    fn set_level(&mut self, high: bool);
}

/// Transmitter key line.
pub struct TxKey {
    pin: Option<Box<dyn OutputPin>>,
    active_high: bool,
    keyed: bool,
}

impl TxKey {
    /// `pin` may be `None` when no TX line is configured; keying then only
    /// reaches sidetone and observers.
    pub fn new(pin: Option<Box<dyn OutputPin>>, active_high: bool) -> Self {
        let mut tx = Self {
            pin,
            active_high,
            keyed: false,
        };
        tx.apply();
        tx
    }

    /// Assert or release the transmitter line. Idempotent.
    pub fn set_keyed(&mut self, keyed: bool) {
        if self.keyed == keyed {
            return;
        }
        self.keyed = keyed;
        self.apply();
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed
    }

    /// Release the line and drop the pin. Idempotent.
    pub fn shutdown(&mut self) {
        self.set_keyed(false);
        self.pin = None;
    }

    fn apply(&mut self) {
        if let Some(pin) = self.pin.as_mut() {
            pin.set_level(self.keyed == self.active_high);
        }
    }
}
