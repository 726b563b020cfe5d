//! MIDI 1.0 byte-level helpers.
//!
//! Status byte ranges:
//! ```text
//! 0x80..=0xEF  Channel voice   (high nibble = type, low nibble = channel)
//! 0xF0         SysEx start
//! 0xF1..=0xF7  System common   (0xF7 = SysEx end)
//! 0xF8..=0xFF  System real-time (always a single byte)
//! ```

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;
pub const TIMING_CLOCK: u8 = 0xF8;

/// Largest non-SysEx MIDI message.
pub const MAX_SHORT_MESSAGE_LEN: usize = 3;

/// Pitch bend centre value (no bend).
pub const PITCH_BEND_CENTER: u16 = 0x2000;

#[inline]
pub const fn is_status(byte: u8) -> bool {
    byte & 0x80 != 0
}

#[inline]
pub const fn is_realtime(byte: u8) -> bool {
    byte >= TIMING_CLOCK
}

#[inline]
pub const fn is_channel_voice(byte: u8) -> bool {
    matches!(byte, 0x80..=0xEF)
}

/// Data bytes following a channel voice status.
///
/// Program Change and Channel Pressure carry one; everything else two.
pub const fn channel_data_len(status: u8) -> usize {
    match status & 0xF0 {
        PROGRAM_CHANGE | CHANNEL_PRESSURE => 1,
        _ => 2,
    }
}

/// Data bytes following a system common status.
pub const fn system_common_data_len(status: u8) -> usize {
    match status {
        0xF1 => 1, // MTC quarter frame
        0xF2 => 2, // Song position pointer
        0xF3 => 1, // Song select
        _ => 0,    // Tune request, SysEx end, undefined
    }
}

/// Note On. Channel is masked to 0-15, note and velocity to 0-127.
pub const fn note_on(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

/// Note Off. Channel is masked to 0-15, note and velocity to 0-127.
pub const fn note_off(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [NOTE_OFF | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

/// Control Change. Channel is masked to 0-15, controller and value to 0-127.
pub const fn control_change(channel: u8, controller: u8, value: u8) -> [u8; 3] {
    [
        CONTROL_CHANGE | (channel & 0x0F),
        controller & 0x7F,
        value & 0x7F,
    ]
}

/// Pitch Bend from a 14-bit value (8192 = centre), sent LSB first.
pub const fn pitch_bend(channel: u8, value: u16) -> [u8; 3] {
    let v14 = value & 0x3FFF;
    [
        PITCH_BEND | (channel & 0x0F),
        (v14 & 0x7F) as u8,
        ((v14 >> 7) & 0x7F) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_voice_lengths() {
        assert_eq!(channel_data_len(0x90), 2);
        assert_eq!(channel_data_len(0x8F), 2);
        assert_eq!(channel_data_len(0xB3), 2);
        assert_eq!(channel_data_len(0xC5), 1);
        assert_eq!(channel_data_len(0xD0), 1);
        assert_eq!(channel_data_len(0xEF), 2);
    }

    #[test]
    fn system_common_lengths() {
        assert_eq!(system_common_data_len(0xF1), 1);
        assert_eq!(system_common_data_len(0xF2), 2);
        assert_eq!(system_common_data_len(0xF3), 1);
        assert_eq!(system_common_data_len(0xF6), 0);
        assert_eq!(system_common_data_len(SYSEX_END), 0);
    }

    #[test]
    fn classification() {
        assert!(is_status(0x80));
        assert!(!is_status(0x7F));
        assert!(is_realtime(0xF8));
        assert!(is_realtime(0xFF));
        assert!(!is_realtime(SYSEX_END));
        assert!(is_channel_voice(0xE5));
        assert!(!is_channel_voice(SYSEX_START));
    }

    #[test]
    fn builders_mask_their_inputs() {
        assert_eq!(note_on(0, 60, 100), [0x90, 0x3C, 0x64]);
        assert_eq!(note_on(0x1F, 0xFF, 0x80), [0x9F, 0x7F, 0x00]);
        assert_eq!(note_off(2, 60, 0), [0x82, 0x3C, 0x00]);
        assert_eq!(control_change(15, 7, 127), [0xBF, 0x07, 0x7F]);
    }

    #[test]
    fn pitch_bend_splits_lsb_msb() {
        assert_eq!(pitch_bend(0, PITCH_BEND_CENTER), [0xE0, 0x00, 0x40]);
        assert_eq!(pitch_bend(1, 0x3FFF), [0xE1, 0x7F, 0x7F]);
        // Bits above 14 are dropped.
        assert_eq!(pitch_bend(0, 0xFFFF), [0xE0, 0x7F, 0x7F]);
    }
}
