//! Bluetooth identifiers for Gira System 3000 devices.
//!
//! This module contains the GATT characteristic and advertisement
//! identifiers needed to talk to Gira covers over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

/// Characteristic that accepts encoded cover commands.
pub const COMMAND_CHARACTERISTIC: Uuid = uuid!("97696341-f77a-43ae-8c35-09f0c5245308");

/// Gira manufacturer ID used in BLE advertisements (0x0584).
pub const MANUFACTURER_ID: u16 = 1412;
