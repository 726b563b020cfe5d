//! BLE-MIDI 13-bit rolling timestamps.
//!
//! Layout in an event packet:
//! ```text
//! Header byte:        1 0 t12 t11 t10 t9 t8 t7   (high 6 bits)
//! Timestamp-low byte: 1 t6 t5 t4 t3 t2 t1 t0     (low 7 bits)
//! ```
//! The counter has 1 ms resolution and wraps at 8192.

/// Largest representable timestamp (ms), also the 13-bit mask.
pub const TIMESTAMP_MASK: u16 = 0x1FFF;

/// Bits of the timestamp carried by the packet header.
pub const HIGH_BITS_MASK: u16 = 0x1F80;

/// Reduce any millisecond value to the 13-bit rolling range.
pub const fn mask(ts: u16) -> u16 {
    ts & TIMESTAMP_MASK
}

/// Packet header byte: `0x80 | ts[12:7]`.
pub const fn header_byte(ts: u16) -> u8 {
    0x80 | ((mask(ts) >> 7) & 0x3F) as u8
}

/// Per-event timestamp byte: `0x80 | ts[6:0]`.
pub const fn ts_low_byte(ts: u16) -> u8 {
    0x80 | (mask(ts) & 0x7F) as u8
}

/// High bits a header byte contributes to a decoded timestamp.
pub(crate) const fn high_from_header(header: u8) -> u16 {
    ((header & 0x3F) as u16) << 7
}

/// Replace the low 7 bits of `ts` with those carried by `low`.
pub(crate) const fn with_low(ts: u16, low: u8) -> u16 {
    (ts & HIGH_BITS_MASK) | (low & 0x7F) as u16
}

/// 13-bit rolling timestamp from a free-running millisecond clock.
pub const fn from_millis(ms: u64) -> u16 {
    (ms & TIMESTAMP_MASK as u64) as u16
}

/// Current rolling timestamp from the Embassy time driver.
#[cfg(feature = "embedded")]
pub fn now() -> u16 {
    from_millis(embassy_time::Instant::now().as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_low_bytes_for_500ms() {
        // 500 = 0b11_1110100 -> high 3, low 0x74
        assert_eq!(header_byte(500), 0x83);
        assert_eq!(ts_low_byte(500), 0xF4);
    }

    #[test]
    fn packing_ignores_bits_above_13() {
        for ts in [0u16, 1, 127, 128, 500, 4096, 8191] {
            for k in 0..8u16 {
                let wrapped = ts.wrapping_add(8192u16.wrapping_mul(k));
                assert_eq!(header_byte(ts), header_byte(wrapped));
                assert_eq!(ts_low_byte(ts), ts_low_byte(wrapped));
            }
        }
    }

    #[test]
    fn top_bit_always_set() {
        for ts in [0u16, 0x7F, 0x80, TIMESTAMP_MASK, u16::MAX] {
            assert_eq!(header_byte(ts) & 0xC0, 0x80);
            assert_eq!(ts_low_byte(ts) & 0x80, 0x80);
        }
    }

    #[test]
    fn decode_helpers_rebuild_timestamp() {
        let ts = 0x1ABC & TIMESTAMP_MASK;
        let rebuilt = with_low(high_from_header(header_byte(ts)), ts_low_byte(ts));
        assert_eq!(rebuilt, ts);
    }

    #[test]
    fn from_millis_wraps_at_8192() {
        assert_eq!(from_millis(0), 0);
        assert_eq!(from_millis(8191), 8191);
        assert_eq!(from_millis(8192), 0);
        assert_eq!(from_millis(8192 * 1000 + 42), 42);
    }
}
