//! Bluetooth Low Energy MIDI profile.
//!
//! The GATT server itself lives in the firmware binary. This module holds
//! everything between the server and the packet codec:
//!
//! 1. **Transport** - the notification primitive the server provides.
//! 2. **Profile** - the shared context (decoder, sink, CCCD state) used
//!    by the receive path and by any number of sending tasks.

pub mod profile;

pub use profile::MidiProfile;

use crate::error::TransportError;

/// Outgoing half of the MIDI I/O characteristic.
pub trait Transport {
    /// Negotiated ATT MTU, if the stack can report it.
    /// `None` falls back to [`DEFAULT_ATT_MTU`](crate::config::DEFAULT_ATT_MTU).
    fn att_mtu(&self) -> Option<u16> {
        None
    }

    /// Send one BEP as a single notification. Blocking, no retry.
    fn notify(&self, bep: &[u8]) -> Result<(), TransportError>;
}
