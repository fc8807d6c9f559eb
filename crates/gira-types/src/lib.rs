//! Platform-agnostic types for Gira System 3000 BLE covers.
//!
//! This crate provides the fixed wire protocol and the types shared by
//! native (gira-core) and any other transport implementations.
//!
//! # Features
//!
//! - Domain types for commands, positions and device identity
//! - Byte-exact command encoder and broadcast decoder
//! - Protocol constants and BLE identifiers
//! - Error types for encoding
//!
//! # Example
//!
//! ```
//! use gira_types::{Command, Position, codec};
//!
//! let bytes = codec::encode(&Command::Stop).unwrap();
//! assert_eq!(bytes.len(), 8);
//! assert_eq!(Position::from_raw(255), Position::CLOSED);
//! ```

pub mod codec;
pub mod error;
pub mod protocol;
pub mod types;
pub mod uuid;

pub use codec::{decode_broadcast, encode};
pub use error::{CodecError, CodecResult};
pub use types::{BroadcastReading, Command, DeviceIdentity, Position};
pub use uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;

    // --- Command tests ---

    #[test]
    fn test_command_from_str() {
        assert_eq!("up".parse::<Command>().unwrap(), Command::MoveUp);
        assert_eq!("OPEN".parse::<Command>().unwrap(), Command::MoveUp);
        assert_eq!("close".parse::<Command>().unwrap(), Command::MoveDown);
        assert_eq!("stop".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!("step-up".parse::<Command>().unwrap(), Command::StepUp);
        assert_eq!("step_down".parse::<Command>().unwrap(), Command::StepDown);
        assert_eq!(
            "position=42".parse::<Command>().unwrap(),
            Command::SetPosition(42)
        );
    }

    #[test]
    fn test_command_from_str_does_not_range_check() {
        assert_eq!(
            "position=150".parse::<Command>().unwrap(),
            Command::SetPosition(150)
        );
    }

    #[test]
    fn test_command_from_str_unknown() {
        assert!(matches!(
            "spin".parse::<Command>(),
            Err(CodecError::UnknownCommand(_))
        ));
        assert!("position=abc".parse::<Command>().is_err());
    }

    #[test]
    fn test_command_display_round_trips_through_from_str() {
        for command in [
            Command::MoveUp,
            Command::MoveDown,
            Command::Stop,
            Command::StepUp,
            Command::StepDown,
            Command::SetPosition(7),
        ] {
            assert_eq!(command.to_string().parse::<Command>().unwrap(), command);
        }
    }

    #[test]
    fn test_command_value_table() {
        assert_eq!(Command::MoveUp.value(), Ok(0x00));
        assert_eq!(Command::MoveDown.value(), Ok(0x01));
        assert_eq!(Command::Stop.value(), Ok(0x00));
        assert_eq!(Command::StepUp.value(), Ok(0x00));
        assert_eq!(Command::StepDown.value(), Ok(0x01));
        assert_eq!(Command::SetPosition(55).value(), Ok(55));
        assert!(Command::SetPosition(-5).value().is_err());
    }

    // --- Position tests ---

    #[test]
    fn test_position_new() {
        assert_eq!(Position::new(0).unwrap(), Position::CLOSED);
        assert_eq!(Position::new(100).unwrap(), Position::OPEN);
        assert!(Position::new(101).is_err());
    }

    #[test]
    fn test_position_from_raw() {
        assert_eq!(Position::from_raw(0).percent(), 100);
        assert_eq!(Position::from_raw(255).percent(), 0);
        assert_eq!(Position::from_raw(128).percent(), 50);
        assert_eq!(Position::from_raw(127).percent(), 50);
        assert_eq!(Position::from_raw(0x7A).percent(), 52);
    }

    #[test]
    fn test_position_from_raw_never_exceeds_100() {
        for raw in 0..=u8::MAX {
            assert!(Position::from_raw(raw).percent() <= 100);
        }
    }

    #[test]
    fn test_position_is_closed() {
        assert!(Position::CLOSED.is_closed());
        assert!(!Position::OPEN.is_closed());
        assert!(Position::OPEN.is_open());
        assert_eq!(Position::OPEN.to_string(), "100%");
    }

    // --- DeviceIdentity tests ---

    #[test]
    fn test_identity_matches_address_case_insensitive() {
        let identity = DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "Living room");
        assert!(identity.matches_address("aa:bb:cc:dd:ee:ff"));
        assert!(identity.matches_address("AA:BB:CC:DD:EE:FF"));
        assert!(!identity.matches_address("AA:BB:CC:DD:EE:00"));
        assert_eq!(identity.normalized_address(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_identity_display() {
        let identity = DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "Kitchen");
        assert_eq!(identity.to_string(), "Kitchen (AA:BB:CC:DD:EE:FF)");
    }

    // --- Serialization tests ---

    #[test]
    fn test_command_serialization() {
        assert_eq!(
            serde_json::to_string(&Command::Stop).unwrap(),
            r#"{"command":"stop"}"#
        );
        assert_eq!(
            serde_json::to_string(&Command::SetPosition(30)).unwrap(),
            r#"{"command":"set_position","percentage":30}"#
        );
    }

    #[test]
    fn test_position_serialization() {
        assert_eq!(serde_json::to_string(&Position::OPEN).unwrap(), "100");
        let parsed: Position = serde_json::from_str("42").unwrap();
        assert_eq!(parsed.percent(), 42);

        let err = serde_json::from_str::<Position>("200").unwrap_err();
        assert!(err.to_string().contains("200"), "{}", err);
        assert!(serde_json::from_str::<Position>("101").is_err());
        assert_eq!(Position::try_from(100).unwrap(), Position::OPEN);
    }
}
