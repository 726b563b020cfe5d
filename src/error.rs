//! Unified error type for the BLE-MIDI profile.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Empty, malformed or oversized input.
    InvalidArgument,

    /// Profile not initialised, shutting down, or notifications disabled.
    NotReady,

    /// Lock acquisition exceeded its bound.
    Timeout,

    /// A fixed-capacity packet buffer could not hold the data.
    OutOfMemory,

    /// The underlying notification transport failed.
    Transport(TransportError),
}

/// Subset of transport errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No central is connected.
    Disconnected,
    /// The stack has no free notification buffers right now.
    Busy,
    /// Raw error code from the BLE stack.
    Raw(u32),
}

/// Failure of a multi-message send, with partial progress.
///
/// Every message before `first_unsent` reached the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendMultiError {
    pub error: Error,
    pub first_unsent: usize,
}

// Convenience conversions

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}
