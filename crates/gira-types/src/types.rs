//! Core types for Gira cover control.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::protocol::{
    MAX_POSITION, PROPERTY_MOVE, PROPERTY_SET_POSITION, PROPERTY_STEP, PROPERTY_STOP,
    VALUE_DOWN, VALUE_STOP, VALUE_UP,
};

/// A control operation understood by a Gira cover actuator.
///
/// `SetPosition` carries a signed value so that out-of-range requests can be
/// represented and rejected by the codec instead of being silently truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "command", content = "percentage", rename_all = "snake_case"))]
pub enum Command {
    /// Move the cover up until it reaches the top or is stopped.
    MoveUp,
    /// Move the cover down until it reaches the bottom or is stopped.
    MoveDown,
    /// Stop any movement.
    Stop,
    /// Move up by a single step.
    StepUp,
    /// Move down by a single step.
    StepDown,
    /// Move to an absolute position (0 = closed, 100 = open).
    SetPosition(i32),
}

impl Command {
    /// Property ID byte for this command.
    #[must_use]
    pub fn property_id(&self) -> u8 {
        match self {
            Command::MoveUp | Command::MoveDown => PROPERTY_MOVE,
            Command::Stop => PROPERTY_STOP,
            Command::StepUp | Command::StepDown => PROPERTY_STEP,
            Command::SetPosition(_) => PROPERTY_SET_POSITION,
        }
    }

    /// Value byte for this command.
    ///
    /// Fails only for `SetPosition` outside `0..=100`.
    pub fn value(&self) -> Result<u8, CodecError> {
        match *self {
            Command::MoveUp | Command::StepUp => Ok(VALUE_UP),
            Command::MoveDown | Command::StepDown => Ok(VALUE_DOWN),
            Command::Stop => Ok(VALUE_STOP),
            Command::SetPosition(p) => {
                if (0..=MAX_POSITION).contains(&p) {
                    Ok(p as u8)
                } else {
                    Err(CodecError::position_out_of_range(p))
                }
            }
        }
    }

    /// Short name used in logs and on the command line.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::MoveUp => "up",
            Command::MoveDown => "down",
            Command::Stop => "stop",
            Command::StepUp => "step-up",
            Command::StepDown => "step-down",
            Command::SetPosition(_) => "position",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetPosition(p) => write!(f, "position={}", p),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Command {
    type Err = CodecError;

    /// Parse a command name.
    ///
    /// Accepts `up`/`open`, `down`/`close`, `stop`, `step-up`, `step-down`
    /// and `position=<n>` (case-insensitive). The position value is not
    /// range-checked here; encoding does that.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "up" | "open" => Ok(Command::MoveUp),
            "down" | "close" => Ok(Command::MoveDown),
            "stop" => Ok(Command::Stop),
            "step-up" | "step_up" => Ok(Command::StepUp),
            "step-down" | "step_down" => Ok(Command::StepDown),
            _ => lower
                .strip_prefix("position=")
                .and_then(|v| v.parse::<i32>().ok())
                .map(Command::SetPosition)
                .ok_or_else(|| CodecError::UnknownCommand(s.to_string())),
        }
    }
}

/// Cover position as a percentage (0 = fully closed, 100 = fully open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Position(u8);

impl Position {
    /// Fully closed.
    pub const CLOSED: Position = Position(0);
    /// Fully open.
    pub const OPEN: Position = Position(100);

    /// Create a position from a percentage, rejecting values above 100.
    pub fn new(percent: u8) -> Result<Self, CodecError> {
        if i32::from(percent) <= MAX_POSITION {
            Ok(Position(percent))
        } else {
            Err(CodecError::position_out_of_range(i32::from(percent)))
        }
    }

    /// Convert a raw broadcast byte to a percentage.
    ///
    /// The device reports 0 for open and 255 for closed, so the value is
    /// inverted and rescaled: `round(100 * (255 - raw) / 255)`.
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        let closed_amount = 255 - u32::from(raw);
        // floor(x + 0.5) with x = 200 * closed_amount / 510
        let percent = (200 * closed_amount + 255) / 510;
        Position(percent as u8)
    }

    /// The percentage value.
    #[must_use]
    pub fn percent(self) -> u8 {
        self.0
    }

    /// Whether the cover is fully closed.
    #[must_use]
    pub fn is_closed(self) -> bool {
        self.0 == 0
    }

    /// Whether the cover is fully open.
    #[must_use]
    pub fn is_open(self) -> bool {
        self.0 == 100
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<u8> for Position {
    type Error = CodecError;

    fn try_from(percent: u8) -> Result<Self, Self::Error> {
        Position::new(percent)
    }
}

impl From<Position> for u8 {
    fn from(position: Position) -> u8 {
        position.0
    }
}

/// A decoded position broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BroadcastReading {
    /// Raw position byte as sent by the device.
    pub raw: u8,
    /// Converted position.
    pub position: Position,
    /// Offset of the broadcast prefix inside the manufacturer data.
    pub offset: usize,
}

/// Identity of one physical cover.
///
/// The address is compared case-insensitively; the name is only used for
/// display and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// BLE address (MAC address on Linux/Windows, UUID on macOS).
    pub address: String,
    /// Human-readable name.
    pub name: String,
}

impl DeviceIdentity {
    /// Create a new identity.
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Whether `address` refers to this device (case-insensitive).
    #[must_use]
    pub fn matches_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }

    /// Lower-case address, used as a lookup key.
    #[must_use]
    pub fn normalized_address(&self) -> String {
        self.address.to_lowercase()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}
