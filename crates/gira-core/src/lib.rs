//! Core BLE library for Gira System 3000 covers.
//!
//! This crate controls Gira shutter and blind actuators over Bluetooth Low
//! Energy and follows their position through passive advertisements.
//!
//! # Features
//!
//! - **Command delivery**: open, close, stop, step and absolute positioning
//! - **Serialized sends**: one command in flight per device, with bounded
//!   connection retry
//! - **Passive position tracking**: decode manufacturer broadcasts without
//!   connecting
//! - **Multi-cover support**: a registry owning every cover in a process
//! - **Testable transport**: all BLE access goes through traits with a mock
//!   implementation
//!
//! # Platform Differences
//!
//! - **macOS**: devices are identified by a CoreBluetooth UUID, not the MAC
//!   address.
//! - **Linux/Windows**: devices are identified by their Bluetooth MAC address
//!   (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gira_core::{BtleTransport, ClientConfig, CoverClient};
//! use gira_types::DeviceIdentity;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BtleTransport::new().await?);
//!     let client = CoverClient::new(
//!         DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "Living room"),
//!         transport,
//!         ClientConfig::default(),
//!     );
//!
//!     client.set_position(40).await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod client;
pub mod cover;
pub mod error;
pub mod events;
pub mod guard;
pub mod mock;
pub mod passive;
pub mod registry;
pub mod retry;
pub mod transport;
pub mod util;

// Core exports
pub use ble::{BtleConfig, BtleConnection, BtleTransport, DiscoveredCover, get_adapter};
pub use client::{ClientConfig, CoverClient};
pub use cover::Cover;
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use events::{CoverEvent, DeviceId, EventDispatcher, EventReceiver};
pub use guard::ConnectionGuard;
pub use mock::{MockConnection, MockTransport, TransportCall};
pub use passive::{ListenerStatus, PassiveListener, PassiveListenerOptions, PositionSnapshot};
pub use registry::CoverRegistry;
pub use retry::{RetryConfig, with_retry_notify};
pub use transport::{
    Advertisement, AdvertisementEvent, AdvertisementFilter, AdvertisementSource, Connection,
    ScanMode, Transport,
};
pub use util::{create_identifier, format_peripheral_id};

// Re-export from gira-types
pub use gira_types::uuid as uuids;
pub use gira_types::{BroadcastReading, Command, DeviceIdentity, Position};
