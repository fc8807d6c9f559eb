//! Command encoding and broadcast decoding.
//!
//! Both directions are pure functions with no I/O, so they can be used
//! from any transport (native BLE, mocks, or recorded captures).
//!
//! # Example
//!
//! ```
//! use gira_types::{Command, codec};
//!
//! let bytes = codec::encode(&Command::SetPosition(42)).unwrap();
//! assert_eq!(&bytes[..], &[0xF6, 0x03, 0x20, 0x01, 0xFC, 0x10, 0x01, 0x2A]);
//!
//! let reading = codec::decode_broadcast(&[0xF7, 0x03, 0x20, 0x01, 0xF6, 0x10, 0x01, 0x00]).unwrap();
//! assert_eq!(reading.position.percent(), 100);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecResult;
use crate::protocol::{BROADCAST_PREFIX, COMMAND_LEN, COMMAND_PREFIX, COMMAND_SUFFIX};
use crate::types::{BroadcastReading, Command, Position};

/// Encode a command into its 8-byte wire form.
///
/// # Errors
///
/// Returns [`CodecError::InvalidArgument`](crate::CodecError::InvalidArgument)
/// for `SetPosition` outside `0..=100`. Other commands cannot fail.
pub fn encode(command: &Command) -> CodecResult<Bytes> {
    let value = command.value()?;

    let mut buf = BytesMut::with_capacity(COMMAND_LEN);
    buf.put_slice(&COMMAND_PREFIX);
    buf.put_u8(command.property_id());
    buf.put_slice(&COMMAND_SUFFIX);
    buf.put_u8(value);
    Ok(buf.freeze())
}

/// Find the first occurrence of the broadcast prefix.
#[must_use]
pub fn find_broadcast_prefix(data: &[u8]) -> Option<usize> {
    data.windows(BROADCAST_PREFIX.len())
        .position(|window| window == BROADCAST_PREFIX)
}

/// Decode a position broadcast from raw manufacturer data.
///
/// Returns `None` when the prefix is missing or nothing follows it. Most
/// advertisements on a shared medium are not position broadcasts, so this
/// is not treated as an error.
#[must_use]
pub fn decode_broadcast(data: &[u8]) -> Option<BroadcastReading> {
    let offset = find_broadcast_prefix(data)?;
    let raw = *data.get(offset + BROADCAST_PREFIX.len())?;
    Some(BroadcastReading {
        raw,
        position: Position::from_raw(raw),
        offset,
    })
}

/// Format bytes as upper-case hex without separators.
#[must_use]
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}
