//! BLE-MIDI Event Packet (BEP) codec.
//!
//! Packet layout:
//! ```text
//! [header] [ts_low] [status] [data...] [ts_low] [status] [data...] ...
//! ```
//! SysEx larger than one packet is split as
//! ```text
//! first:  [header] [ts_low] F0 [data...]
//! middle: [header] [data...]                 (no timestamp byte)
//! last:   [header] [ts_low] [data...] F7
//! ```

pub mod decoder;
pub mod encoder;


use crate::config::MAX_PACKET_LEN;

pub use decoder::{Decoder, DecoderStats};
pub use encoder::{Batch, Encoder, MultiPacker, SysexFragments, TimedMessage};

/// One BLE-MIDI Event Packet, ready for a single notification.
pub type Packet = heapless::Vec<u8, MAX_PACKET_LEN>;

/// A decoded event handed to closure sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiEvent<'a> {
    /// One complete MIDI message (status + data). SysEx arrives whole,
    /// 0xF0 through 0xF7; real-time bytes arrive as 1-byte messages.
    Message(&'a [u8]),
    /// A SysEx exceeded the reassembly buffer and was discarded.
    SysexOverflow,
}

/// Receiver of decoded MIDI traffic.
///
/// Called from the transport's receive context with the profile lock
/// held: keep handlers short or hand off to another task.
pub trait MessageSink {
    /// A complete MIDI message with its 13-bit timestamp.
    fn on_message(&mut self, timestamp: u16, message: &[u8]);

    /// The SysEx in progress overflowed and was dropped.
    fn on_overflow(&mut self, timestamp: u16);

    /// Raw BEP payload, before decoding.
    fn on_packet(&mut self, _bep: &[u8]) {}
}

impl<F> MessageSink for F
where
    F: FnMut(u16, MidiEvent<'_>),
{
    fn on_message(&mut self, timestamp: u16, message: &[u8]) {
        self(timestamp, MidiEvent::Message(message))
    }

    fn on_overflow(&mut self, timestamp: u16) {
        self(timestamp, MidiEvent::SysexOverflow)
    }
}
