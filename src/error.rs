//! Crate error types.
//!
//! Errors never unwind across subsystem layers: a failing observer or codec
//! write is reported to the caller of the operation that hit it, counted, or
//! logged, never propagated back into the keying path.

/// Keyer error with code and message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// E01: Operation not valid in the current state (double init, not started)
    InvalidState,
    /// E02: Argument outside the accepted range
    InvalidArg,
    /// E03: Allocation or task creation failed
    NoMem,
    /// E04: Bounded wait expired (codec DMA write)
    Timeout,
    /// E05: Bus-level I/O failure (I2C/I2S)
    Bus,
}

/// Crate-wide result alias
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState => "E01",
            Self::InvalidArg => "E02",
            Self::NoMem => "E03",
            Self::Timeout => "E04",
            Self::Bus => "E05",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid state",
            Self::InvalidArg => "invalid argument",
            Self::NoMem => "out of memory",
            Self::Timeout => "timeout",
            Self::Bus => "bus error",
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}
