//! Protocol constants and compile-time configuration.
//!
//! ATT sizing, buffer capacities, lock timing and the GATT identity of
//! the MIDI service live here so they can be tuned in one place.

// ATT / packet sizing

/// Minimum ATT MTU every LE link supports.
/// Used whenever the transport cannot report the negotiated value.
pub const DEFAULT_ATT_MTU: u16 = 23;

/// ATT notification header (opcode + attribute handle).
pub const ATT_OVERHEAD: u16 = 3;

/// Largest BLE-MIDI Event Packet we ever build, regardless of MTU.
pub const MAX_PACKET_LEN: usize = 256;

/// Capacity of the SysEx reassembly buffer (includes 0xF0 and 0xF7).
pub const SYSEX_CAPACITY: usize = 256;

// Locking

/// Bounded wait for the profile lock on the receive path (ms).
/// The transport callback must never block indefinitely.
pub const RX_LOCK_TIMEOUT_MS: u32 = 100;

/// Bounded wait for the profile lock during teardown (ms).
pub const DEINIT_LOCK_TIMEOUT_MS: u32 = 1000;

/// Grace period after a failed teardown lock so in-flight receive
/// callbacks observe the shutdown flag (ms).
pub const DEINIT_GRACE_MS: u32 = 150;

// GATT identity
//
//   MIDI Service          03B80E5A-EDE8-4B33-A751-6CE34EC4C700
//   MIDI I/O Characteristic 7772E5DB-3868-4112-A1A9-F2669D106BF3

/// MIDI service UUID, little-endian (advertising data byte order).
pub const MIDI_SERVICE_UUID128: [u8; 16] = [
    0x00, 0xC7, 0xC4, 0x4E, 0xE3, 0x6C, 0x51, 0xA7, 0x33, 0x4B, 0xE8, 0xED, 0x5A, 0x0E, 0xB8, 0x03,
];

/// MIDI I/O characteristic UUID, little-endian.
pub const MIDI_IO_CHAR_UUID128: [u8; 16] = [
    0xF3, 0x6B, 0x10, 0x9D, 0x66, 0xF2, 0xA9, 0xA1, 0x12, 0x41, 0x68, 0x38, 0xDB, 0xE5, 0x72, 0x77,
];

// Firmware

/// ATT MTU requested from the SoftDevice for each connection.
pub const PREFERRED_ATT_MTU: u16 = 128;

/// GAP device name (also placed in the scan response).
pub const DEVICE_NAME: &str = "BLE-MIDI";

/// Advertising interval (in 0.625 ms units). 160 = 100 ms.
pub const ADV_INTERVAL: u32 = 160;

/// Period of the demo note sender in the firmware (ms).
pub const DEMO_NOTE_PERIOD_MS: u64 = 1000;
