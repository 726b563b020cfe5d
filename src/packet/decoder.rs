//! BEP decoder with SysEx reassembly and running status.
//!
//! Malformed input never raises a hard error past the header check: the
//! rest of the offending packet is dropped and counted in [`DecoderStats`].

use super::MessageSink;
use crate::config::SYSEX_CAPACITY;
use crate::error::Error;
use crate::midi::{
    channel_data_len, is_channel_voice, is_realtime, is_status, system_common_data_len,
    MAX_SHORT_MESSAGE_LEN, SYSEX_END, SYSEX_START,
};
use crate::timestamp::{high_from_header, with_low};

/// Diagnostic counters. All wrap on overflow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecoderStats {
    /// Packets with a valid header.
    pub packets: u32,
    /// Packets whose tail was dropped as malformed.
    pub truncated: u32,
    /// SysEx messages discarded because they outgrew the buffer.
    pub overflows: u32,
}

/// Stateful BLE-MIDI decoder.
///
/// `N` is the SysEx reassembly capacity, including the framing bytes.
/// State persists across packets of one connection; call [`reset`]
/// when the link goes away.
///
/// [`reset`]: Decoder::reset
pub struct Decoder<const N: usize = SYSEX_CAPACITY> {
    sysex: heapless::Vec<u8, N>,
    sysex_active: bool,
    running_status: Option<u8>,
    stats: DecoderStats,
}

/// Dispatch target plus the timestamp currently in effect.
struct Emitter<'s, S: ?Sized> {
    sink: &'s mut S,
    timestamp: u16,
    count: usize,
}

impl<S: MessageSink + ?Sized> Emitter<'_, S> {
    fn message(&mut self, message: &[u8]) {
        self.sink.on_message(self.timestamp, message);
        self.count += 1;
    }

    fn overflow(&mut self) {
        self.sink.on_overflow(self.timestamp);
        self.count += 1;
    }
}

impl<const N: usize> Default for Decoder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Decoder<N> {
    pub const fn new() -> Self {
        Self {
            sysex: heapless::Vec::new(),
            sysex_active: false,
            running_status: None,
            stats: DecoderStats {
                packets: 0,
                truncated: 0,
                overflows: 0,
            },
        }
    }

    /// Drop any partial SysEx and running status. Counters are kept.
    pub fn reset(&mut self) {
        self.sysex.clear();
        self.sysex_active = false;
        self.running_status = None;
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn is_sysex_active(&self) -> bool {
        self.sysex_active
    }

    pub fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    /// Decode one BEP payload, dispatching each message to `sink` in order.
    ///
    /// Returns the number of events dispatched. Fails with
    /// `InvalidArgument`, without touching the sink, when the payload is
    /// empty or its header lacks the top bit.
    pub fn decode<S>(&mut self, bep: &[u8], sink: &mut S) -> Result<usize, Error>
    where
        S: MessageSink + ?Sized,
    {
        let (&header, body) = bep.split_first().ok_or(Error::InvalidArgument)?;
        if !is_status(header) {
            return Err(Error::InvalidArgument);
        }
        self.stats.packets = self.stats.packets.wrapping_add(1);

        let mut out = Emitter {
            sink,
            timestamp: high_from_header(header),
            count: 0,
        };

        if !self.decode_events(body, &mut out) {
            self.stats.truncated = self.stats.truncated.wrapping_add(1);
            debug!("BEP truncated after {} events", out.count);
        }
        Ok(out.count)
    }

    /// Walk the events of one packet. Returns `false` if the tail was dropped.
    fn decode_events<S>(&mut self, data: &[u8], out: &mut Emitter<'_, S>) -> bool
    where
        S: MessageSink + ?Sized,
    {
        let mut idx = 0;
        while idx < data.len() {
            let byte = data[idx];
            if !is_status(byte) {
                // SysEx continuation packet: header directly followed by data.
                if self.sysex_active {
                    idx = self.consume_sysex(data, idx, out);
                    continue;
                }
                return false;
            }

            out.timestamp = with_low(out.timestamp, byte);
            idx += 1;

            let Some(&first) = data.get(idx) else {
                // Timestamp with no event after it.
                return false;
            };

            if self.sysex_active {
                idx = self.consume_sysex(data, idx, out);
                continue;
            }

            if is_realtime(first) {
                out.message(&data[idx..=idx]);
                idx += 1;
                // Only running-status data may follow without a new timestamp.
                if !data.get(idx).is_some_and(|&b| !is_status(b)) {
                    continue;
                }
            }
            let lead = data[idx];

            if lead == SYSEX_START {
                self.sysex.clear();
                // Cannot fail: capacity is at least one byte.
                let _ = self.sysex.push(SYSEX_START);
                self.sysex_active = true;
                self.running_status = None;
                idx = self.consume_sysex(data, idx + 1, out);
                continue;
            }

            let (status, payload) = if is_status(lead) {
                (lead, &data[idx + 1..])
            } else {
                match self.running_status {
                    Some(status) => (status, &data[idx..]),
                    None => return false,
                }
            };
            let need = if is_channel_voice(status) {
                channel_data_len(status)
            } else {
                system_common_data_len(status)
            };
            let Some(message) = short_message(status, payload, need) else {
                return false;
            };
            out.message(&message[..=need]);

            if is_status(lead) {
                idx += 1;
                self.running_status = is_channel_voice(status).then_some(status);
            }
            idx += need;
        }
        true
    }

    /// Append SysEx bytes starting at `idx` until the terminator, a
    /// non-real-time status byte, or the end of the packet. Returns the
    /// index of the first unconsumed byte.
    fn consume_sysex<S>(&mut self, data: &[u8], mut idx: usize, out: &mut Emitter<'_, S>) -> usize
    where
        S: MessageSink + ?Sized,
    {
        while idx < data.len() {
            let byte = data[idx];
            if is_realtime(byte) {
                out.message(&data[idx..=idx]);
                idx += 1;
                continue;
            }
            if byte == SYSEX_END {
                idx += 1;
                if self.sysex.push(byte).is_ok() {
                    out.message(&self.sysex);
                } else {
                    self.overflow(out);
                }
                self.sysex.clear();
                self.sysex_active = false;
                return idx;
            }
            if is_status(byte) {
                return idx;
            }
            if self.sysex.push(byte).is_err() {
                self.overflow(out);
                self.sysex.clear();
                self.sysex_active = false;
                while idx < data.len() && !is_status(data[idx]) {
                    idx += 1;
                }
                return idx;
            }
            idx += 1;
        }
        idx
    }

    fn overflow<S>(&mut self, out: &mut Emitter<'_, S>)
    where
        S: MessageSink + ?Sized,
    {
        self.stats.overflows = self.stats.overflows.wrapping_add(1);
        warn!("SysEx exceeded {} bytes, dropped", N);
        out.overflow();
    }
}

/// Assemble `status` plus `need` data bytes from the front of `payload`.
/// `None` if the payload is short or a data byte has its top bit set.
fn short_message(status: u8, payload: &[u8], need: usize) -> Option<[u8; MAX_SHORT_MESSAGE_LEN]> {
    let data = payload.get(..need)?;
    if data.iter().any(|&b| is_status(b)) {
        return None;
    }
    let mut message = [status, 0, 0];
    message[1..=need].copy_from_slice(data);
    Some(message)
}
