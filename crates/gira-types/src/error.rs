//! Error types for the command codec in gira-types.

use thiserror::Error;

/// Errors that can occur when encoding commands for a Gira device.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in gira-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// A command argument is outside the range the device accepts.
    #[error("Invalid argument: {value} is outside {min}..={max}")]
    InvalidArgument {
        /// The rejected value.
        value: i32,
        /// Smallest accepted value.
        min: i32,
        /// Largest accepted value.
        max: i32,
    },

    /// A command name could not be parsed.
    #[error("Unknown command: '{0}'")]
    UnknownCommand(String),
}

impl CodecError {
    /// Create an out-of-range error for a position percentage.
    pub fn position_out_of_range(value: i32) -> Self {
        Self::InvalidArgument {
            value,
            min: 0,
            max: 100,
        }
    }
}

/// Result type alias using gira-types' CodecError type.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_out_of_range_display() {
        let err = CodecError::position_out_of_range(101);
        assert_eq!(err.to_string(), "Invalid argument: 101 is outside 0..=100");
    }

    #[test]
    fn test_unknown_command_display() {
        let err = CodecError::UnknownCommand("spin".to_string());
        assert!(err.to_string().contains("spin"));
    }
}
