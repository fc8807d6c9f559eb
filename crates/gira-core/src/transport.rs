//! Trait abstractions over the BLE stack.
//!
//! The connection manager and the passive listener never talk to a radio
//! directly. They go through [`Transport`] (active GATT connections) and
//! [`AdvertisementSource`] (unsolicited advertisements). [`BtleTransport`]
//! implements both over btleplug; [`MockTransport`] implements both for
//! tests.
//!
//! [`BtleTransport`]: crate::ble::BtleTransport
//! [`MockTransport`]: crate::mock::MockTransport

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;

/// An open GATT connection to one device.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Check if the link is still up.
    async fn is_connected(&self) -> bool;

    /// Write `data` to the characteristic identified by `uuid`.
    ///
    /// With `require_ack` the write waits for the peripheral's response.
    async fn write_characteristic(&self, uuid: Uuid, data: &[u8], require_ack: bool)
    -> Result<()>;

    /// Close the link.
    async fn disconnect(&self) -> Result<()>;
}

/// Active side of the BLE stack.
///
/// Bounded retry and per-attempt timeouts are applied by
/// [`CoverClient`](crate::client::CoverClient), so `connect` makes exactly
/// one attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opaque handle from the stack's discovery cache.
    type Descriptor: Send + Sync;
    /// Connection type produced by [`Transport::connect`].
    type Connection: Connection + 'static;

    /// Look up a device by address, case-insensitively.
    ///
    /// `Ok(None)` means the stack currently has no path to the device.
    async fn resolve_device(&self, address: &str) -> Result<Option<Self::Descriptor>>;

    /// Make a single connection attempt.
    async fn connect(&self, descriptor: &Self::Descriptor) -> Result<Self::Connection>;
}

/// Scan mode requested from the advertisement source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Listen only; never send scan requests.
    #[default]
    Passive,
    /// Send scan requests to obtain scan responses.
    Active,
}

/// Which advertisements an [`AdvertisementSource`] should deliver.
#[derive(Debug, Clone)]
pub struct AdvertisementFilter {
    /// Only deliver events for this address (case-insensitive).
    pub address: Option<String>,
    /// Requested scan mode. Stacks that cannot honour it scan anyway.
    pub mode: ScanMode,
    /// Emit [`AdvertisementEvent::Unavailable`] after this long without an
    /// advertisement from a device that was previously seen.
    pub unavailable_after: Duration,
}

impl Default for AdvertisementFilter {
    fn default() -> Self {
        Self {
            address: None,
            mode: ScanMode::Passive,
            unavailable_after: Duration::from_secs(900),
        }
    }
}

impl AdvertisementFilter {
    /// Filter for a single address.
    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }

    /// Set the staleness timeout.
    #[must_use]
    pub fn unavailable_after(mut self, timeout: Duration) -> Self {
        self.unavailable_after = timeout;
        self
    }

    /// Set the scan mode.
    #[must_use]
    pub fn mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether `address` passes this filter.
    pub fn matches(&self, address: &str) -> bool {
        self.address
            .as_deref()
            .is_none_or(|wanted| wanted.eq_ignore_ascii_case(address))
    }
}

/// One received advertisement.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    /// Source address.
    pub address: String,
    /// Advertised local name.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Manufacturer-specific data keyed by company id.
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl Advertisement {
    /// Advertisement with a single manufacturer data entry.
    pub fn with_manufacturer_data(
        address: impl Into<String>,
        company_id: u16,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            address: address.into(),
            manufacturer_data: HashMap::from([(company_id, data.into())]),
            ..Default::default()
        }
    }
}

/// An event delivered by an [`AdvertisementSource`].
#[derive(Debug, Clone)]
pub enum AdvertisementEvent {
    /// An advertisement was received.
    Advertisement(Advertisement),
    /// The stack has not seen the device for the configured timeout.
    Unavailable {
        /// Address of the device that went quiet.
        address: String,
    },
}

impl AdvertisementEvent {
    /// Address the event concerns.
    pub fn address(&self) -> &str {
        match self {
            AdvertisementEvent::Advertisement(adv) => &adv.address,
            AdvertisementEvent::Unavailable { address } => address,
        }
    }
}

/// Passive side of the BLE stack.
#[async_trait]
pub trait AdvertisementSource: Send + Sync {
    /// Subscribe to advertisements matching `filter`.
    ///
    /// The stream ends when the underlying scan stops.
    async fn advertisements(
        &self,
        filter: &AdvertisementFilter,
    ) -> Result<BoxStream<'static, AdvertisementEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_default_is_passive() {
        let filter = AdvertisementFilter::default();
        assert_eq!(filter.mode, ScanMode::Passive);
        assert_eq!(filter.unavailable_after, Duration::from_secs(900));
        assert!(filter.matches("anything"));
    }

    #[test]
    fn test_filter_matches_case_insensitive() {
        let filter = AdvertisementFilter::for_address("AA:BB:CC:DD:EE:FF");
        assert!(filter.matches("aa:bb:cc:dd:ee:ff"));
        assert!(!filter.matches("aa:bb:cc:dd:ee:00"));
    }

    #[test]
    fn test_event_address() {
        let event = AdvertisementEvent::Advertisement(Advertisement::with_manufacturer_data(
            "AA:BB",
            1412,
            vec![0x01],
        ));
        assert_eq!(event.address(), "AA:BB");

        let event = AdvertisementEvent::Unavailable {
            address: "CC:DD".to_string(),
        };
        assert_eq!(event.address(), "CC:DD");
    }
}
