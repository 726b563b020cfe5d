//! BEP encoder and MTU-driven fragmenter.
//!
//! Every packet produced here fits `min(ATT_MTU - 3, MAX_PACKET_LEN)`.
//! Multi-message packing and SysEx fragmentation are exposed as
//! iterators so the caller owns transmission, error handling and retries.

use super::Packet;
use crate::config::{ATT_OVERHEAD, MAX_PACKET_LEN};
use crate::error::Error;
use crate::midi::{SYSEX_END, SYSEX_START};
use crate::timestamp::{header_byte, mask, ts_low_byte, HIGH_BITS_MASK};

/// Overhead of a packet carrying a timestamp-low byte: header + ts_low.
const TIMESTAMPED_OVERHEAD: usize = 2;

/// A MIDI message with the time it should be stamped with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedMessage<'a> {
    pub timestamp: u16,
    pub bytes: &'a [u8],
}

impl<'a> TimedMessage<'a> {
    pub const fn new(timestamp: u16, bytes: &'a [u8]) -> Self {
        Self { timestamp, bytes }
    }
}

/// Packet builder bound to a negotiated ATT MTU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Encoder {
    capacity: usize,
}

impl Encoder {
    /// Size packets for `mtu`. Values below the ATT overhead leave no room
    /// and every encode call fails with `InvalidArgument`.
    pub fn for_mtu(mtu: u16) -> Self {
        let capacity = usize::from(mtu.saturating_sub(ATT_OVERHEAD)).min(MAX_PACKET_LEN);
        Self { capacity }
    }

    /// Maximum BEP size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `[header][ts_low][message...]`
    pub fn encode_single(&self, message: &[u8], timestamp: u16) -> Result<Packet, Error> {
        if message.is_empty() || message.len() + TIMESTAMPED_OVERHEAD > self.capacity {
            return Err(Error::InvalidArgument);
        }
        let mut packet = Packet::new();
        push(&mut packet, &[header_byte(timestamp), ts_low_byte(timestamp)])?;
        push(&mut packet, message)?;
        Ok(packet)
    }

    /// `[header][chunk...]`: a SysEx continuation without timestamp byte.
    pub fn encode_middle(&self, chunk: &[u8], timestamp: u16) -> Result<Packet, Error> {
        if chunk.is_empty() || chunk.len() + 1 > self.capacity {
            return Err(Error::InvalidArgument);
        }
        let mut packet = Packet::new();
        push(&mut packet, &[header_byte(timestamp)])?;
        push(&mut packet, chunk)?;
        Ok(packet)
    }

    /// Greedily pack `messages` into as few packets as possible.
    ///
    /// A packet is closed when the next message would not fit, or when its
    /// timestamp needs different header bits. Empty messages are skipped.
    pub fn pack_multi<'a>(&self, messages: &'a [TimedMessage<'a>]) -> MultiPacker<'a> {
        MultiPacker {
            capacity: self.capacity,
            messages,
            next: 0,
            failed: false,
        }
    }

    /// Split a complete `F0 .. F7` SysEx into packets.
    ///
    /// Fails with `InvalidArgument` if the framing bytes are missing or the
    /// MTU leaves no room for a fragment.
    pub fn fragment_sysex<'a>(
        &self,
        sysex: &'a [u8],
        timestamp: u16,
    ) -> Result<SysexFragments<'a>, Error> {
        let framed = sysex.len() >= 2
            && sysex.first() == Some(&SYSEX_START)
            && sysex.last() == Some(&SYSEX_END);
        if !framed || self.capacity <= 3 {
            return Err(Error::InvalidArgument);
        }

        let stage = if sysex.len() + TIMESTAMPED_OVERHEAD <= self.capacity {
            Stage::Single
        } else {
            Stage::First
        };
        Ok(SysexFragments {
            encoder: *self,
            sysex,
            timestamp,
            pos: 0,
            stage,
        })
    }

    /// Room for SysEx data in a first or last fragment
    /// (`[header][ts_low]F0` / `[header][ts_low]..F7`).
    fn edge_capacity(&self) -> usize {
        self.capacity - 3
    }

    /// Room for SysEx data in a middle fragment (`[header]`).
    fn middle_capacity(&self) -> usize {
        self.capacity - 1
    }
}

fn push(packet: &mut Packet, bytes: &[u8]) -> Result<(), Error> {
    packet
        .extend_from_slice(bytes)
        .map_err(|_| Error::OutOfMemory)
}

/// One packet of a multi-message send and the messages it carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    /// Index of the first message in this packet.
    pub first_index: usize,
    /// Index of the first message *not* in this packet.
    pub next_index: usize,
    pub packet: Packet,
}

/// Iterator returned by [`Encoder::pack_multi`].
///
/// Yields `Err(index)` once, then stops, if the message at `index` cannot
/// fit even an empty packet.
pub struct MultiPacker<'a> {
    capacity: usize,
    messages: &'a [TimedMessage<'a>],
    next: usize,
    failed: bool,
}

impl Iterator for MultiPacker<'_> {
    type Item = Result<Batch, usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self
            .messages
            .get(self.next)
            .is_some_and(|m| m.bytes.is_empty())
        {
            self.next += 1;
        }
        let lead = self.messages.get(self.next)?;

        let first_index = self.next;
        let header_bits = mask(lead.timestamp) & HIGH_BITS_MASK;
        let mut packet = Packet::new();
        // Capacity is bounded by MAX_PACKET_LEN, so pushes below cannot fail.
        let _ = packet.push(header_byte(lead.timestamp));

        while let Some(message) = self.messages.get(self.next) {
            if message.bytes.is_empty() {
                self.next += 1;
                continue;
            }
            if mask(message.timestamp) & HIGH_BITS_MASK != header_bits {
                break;
            }
            if packet.len() + 1 + message.bytes.len() > self.capacity {
                break;
            }
            let _ = packet.push(ts_low_byte(message.timestamp));
            let _ = packet.extend_from_slice(message.bytes);
            self.next += 1;
        }

        if self.next == first_index {
            self.failed = true;
            return Some(Err(first_index));
        }
        Some(Ok(Batch {
            first_index,
            next_index: self.next,
            packet,
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Single,
    First,
    Middle,
    Done,
}

/// Iterator returned by [`Encoder::fragment_sysex`].
///
/// Only the first and last fragments carry a timestamp-low byte.
pub struct SysexFragments<'a> {
    encoder: Encoder,
    sysex: &'a [u8],
    timestamp: u16,
    pos: usize,
    stage: Stage,
}

impl SysexFragments<'_> {
    /// `[header][ts_low][data...]F7` from everything left.
    fn last(&mut self) -> Option<Packet> {
        self.stage = Stage::Done;
        let data = &self.sysex[self.pos..self.sysex.len() - 1];
        let mut packet = Packet::new();
        let _ = packet.extend_from_slice(&[header_byte(self.timestamp), ts_low_byte(self.timestamp)]);
        let _ = packet.extend_from_slice(data);
        let _ = packet.push(SYSEX_END);
        Some(packet)
    }
}

impl Iterator for SysexFragments<'_> {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        match self.stage {
            Stage::Done => None,
            Stage::Single => {
                self.stage = Stage::Done;
                self.encoder.encode_single(self.sysex, self.timestamp).ok()
            }
            Stage::First => {
                // The whole message did not fit, so the chunk never reaches F7.
                let chunk = self.encoder.edge_capacity();
                let mut packet = Packet::new();
                let _ = packet.extend_from_slice(&[
                    header_byte(self.timestamp),
                    ts_low_byte(self.timestamp),
                    SYSEX_START,
                ]);
                let _ = packet.extend_from_slice(&self.sysex[1..1 + chunk]);
                self.pos = 1 + chunk;
                self.stage = Stage::Middle;
                Some(packet)
            }
            Stage::Middle => {
                let remaining = self.sysex.len() - self.pos;
                // What is left (F7 included) fits a last fragment.
                if remaining <= self.encoder.edge_capacity() + 1 {
                    return self.last();
                }
                let chunk = (remaining - 1).min(self.encoder.middle_capacity());
                let packet = self
                    .encoder
                    .encode_middle(&self.sysex[self.pos..self.pos + chunk], self.timestamp)
                    .ok();
                self.pos += chunk;
                packet
            }
        }
    }
}
