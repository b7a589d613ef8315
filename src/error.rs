//! Unified error types for the FLM control plane.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! scheduler shell's error handling uniform. All variants are `Copy` so
//! they can be passed through the safety aggregator and state machines
//! without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An E2E primitive was handed malformed input.
    E2e(E2eError),
    /// An ADC or DIO access failed.
    Hal(HalError),
    /// Configuration is internally inconsistent.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::E2e(e) => write!(f, "e2e: {e}"),
            Self::Hal(e) => write!(f, "hal: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// E2E contract violations
// ---------------------------------------------------------------------------

/// Contract violations at the E2E library boundary. These are programming
/// errors, not bus faults: the primitives return them without touching the
/// destination state, so a bad call can never corrupt a check state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum E2eError {
    /// Frame buffer is empty or shorter than the configured data length.
    InvalidLength,
    /// Counter or CRC offset points outside the frame.
    OffsetOutOfRange,
}

impl fmt::Display for E2eError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength => write!(f, "frame length invalid"),
            Self::OffsetOutOfRange => write!(f, "field offset outside frame"),
        }
    }
}

impl From<E2eError> for Error {
    fn from(e: E2eError) -> Self {
        Self::E2e(e)
    }
}

// ---------------------------------------------------------------------------
// HAL errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// ADC conversion has not completed for the requested channel.
    AdcNotReady,
    /// The channel id does not exist.
    UnknownChannel,
    /// Write attempted on a read-only channel.
    ChannelReadOnly,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdcNotReady => write!(f, "ADC conversion not ready"),
            Self::UnknownChannel => write!(f, "unknown channel"),
            Self::ChannelReadOnly => write!(f, "channel is read-only"),
        }
    }
}

impl From<HalError> for Error {
    fn from(e: HalError) -> Self {
        Self::Hal(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
