//! MIDI over Bluetooth Low Energy.
//!
//! Host-testable core of the BLE-MIDI firmware:
//!
//! - [`packet`] - BLE-MIDI Event Packet (BEP) decoder and encoder,
//!   including SysEx reassembly and MTU-driven fragmentation.
//! - [`ble`] - the MIDI profile context shared between the GATT receive
//!   path and sending tasks.
//! - [`timestamp`], [`midi`] - 13-bit timestamps and MIDI byte helpers.
//!
//! Usage: `cargo test` (host) or `cargo build --release --features embedded`.
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main].
//! Everything here builds without hardware and is exercised on the host.

#![cfg_attr(not(test), no_std)]

// Must come first: the logging macros are textually scoped.
#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod midi;
pub mod packet;
pub mod timestamp;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use ble::{MidiProfile, Transport};
pub use error::{Error, SendMultiError, TransportError};
pub use packet::{Decoder, DecoderStats, Encoder, MessageSink, MidiEvent, Packet, TimedMessage};
