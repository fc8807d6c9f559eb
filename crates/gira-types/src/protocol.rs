//! Wire constants for the Gira command and broadcast protocol.
//!
//! Every outbound command is eight bytes:
//! `[COMMAND_PREFIX(4), property_id, COMMAND_SUFFIX(2), value]`.
//!
//! Position broadcasts carry [`BROADCAST_PREFIX`] somewhere in the
//! manufacturer data, immediately followed by one position byte.

/// Leading bytes of every command.
pub const COMMAND_PREFIX: [u8; 4] = [0xF6, 0x03, 0x20, 0x01];

/// Bytes between the property ID and the value.
pub const COMMAND_SUFFIX: [u8; 2] = [0x10, 0x01];

/// Total encoded command length.
pub const COMMAND_LEN: usize = COMMAND_PREFIX.len() + 1 + COMMAND_SUFFIX.len() + 1;

/// Property ID for continuous up/down movement.
pub const PROPERTY_MOVE: u8 = 0xFF;

/// Property ID for single-step movement.
pub const PROPERTY_STEP: u8 = 0xFE;

/// Property ID for stopping movement.
pub const PROPERTY_STOP: u8 = 0xFD;

/// Property ID for absolute positioning (value = percentage).
pub const PROPERTY_SET_POSITION: u8 = 0xFC;

/// Direction value: up.
pub const VALUE_UP: u8 = 0x00;

/// Direction value: down.
pub const VALUE_DOWN: u8 = 0x01;

/// Value sent with the stop property.
pub const VALUE_STOP: u8 = 0x00;

/// Marker preceding the position byte in a broadcast.
pub const BROADCAST_PREFIX: [u8; 7] = [0xF7, 0x03, 0x20, 0x01, 0xF6, 0x10, 0x01];

/// Largest accepted set-position percentage.
pub const MAX_POSITION: i32 = 100;
