//! btleplug implementation of the transport traits.
//!
//! Device lookup uses the adapter's known peripherals. When a device is not
//! known yet, a short scan is run before giving up.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval, sleep, timeout};
use tracing::{debug, info};
use uuid::Uuid;

use gira_types::uuids::{COMMAND_CHARACTERISTIC, MANUFACTURER_ID};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::transport::{
    Advertisement, AdvertisementEvent, AdvertisementFilter, AdvertisementSource, Connection,
    ScanMode, Transport,
};
use crate::util::{address_matches, create_identifier, format_peripheral_id};

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Configuration for [`BtleTransport`].
#[derive(Debug, Clone)]
pub struct BtleConfig {
    /// Scan this long when a device is not in the adapter's cache
    /// (zero disables the scan).
    pub lookup_scan: Duration,
    /// Timeout for GATT service discovery after connecting.
    pub discovery_timeout: Duration,
}

impl Default for BtleConfig {
    fn default() -> Self {
        Self {
            lookup_scan: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(15),
        }
    }
}

impl BtleConfig {
    /// Set the lookup scan duration.
    #[must_use]
    pub fn lookup_scan(mut self, duration: Duration) -> Self {
        self.lookup_scan = duration;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

/// A cover seen during [`BtleTransport::discover`].
#[derive(Debug, Clone)]
pub struct DiscoveredCover {
    /// Connection identifier (peripheral ID on macOS, address elsewhere).
    pub address: String,
    /// Advertised name.
    pub name: Option<String>,
    /// Signal strength.
    pub rssi: Option<i16>,
    /// Raw manufacturer data under the Gira company id.
    pub manufacturer_data: Vec<u8>,
}

/// BLE stack backed by the first system adapter.
#[derive(Clone)]
pub struct BtleTransport {
    adapter: Adapter,
    config: BtleConfig,
    scanners: Arc<AtomicUsize>,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("config", &self.config)
            .field("scanners", &self.scanners.load(Ordering::Relaxed))
            .finish()
    }
}

impl BtleTransport {
    /// Open the first Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        Self::with_config(BtleConfig::default()).await
    }

    /// Open the first Bluetooth adapter with custom settings.
    pub async fn with_config(config: BtleConfig) -> Result<Self> {
        Ok(Self::with_adapter(get_adapter().await?, config))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter, config: BtleConfig) -> Self {
        Self {
            adapter,
            config,
            scanners: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Scan for `duration` and list every device advertising Gira
    /// manufacturer data.
    pub async fn discover(&self, duration: Duration) -> Result<Vec<DiscoveredCover>> {
        info!("Scanning for covers for {} seconds...", duration.as_secs());
        self.adapter.start_scan(ScanFilter::default()).await?;
        sleep(duration).await;
        self.stop_scan_if_idle().await;

        let mut found = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            if let Some(data) = props.manufacturer_data.get(&MANUFACTURER_ID) {
                found.push(DiscoveredCover {
                    address: create_identifier(&props.address.to_string(), &peripheral.id()),
                    name: props.local_name.clone(),
                    rssi: props.rssi,
                    manufacturer_data: data.clone(),
                });
            }
        }
        info!("Scan complete. Found {} cover(s)", found.len());
        Ok(found)
    }

    async fn find_known(&self, address: &str) -> Result<Option<Peripheral>> {
        for peripheral in self.adapter.peripherals().await? {
            let peripheral_id = format_peripheral_id(&peripheral.id());
            if address_matches(&peripheral_id, address) {
                debug!("Matched by peripheral ID: {}", peripheral_id);
                return Ok(Some(peripheral));
            }
            if let Ok(Some(props)) = peripheral.properties().await
                && address_matches(&props.address.to_string(), address)
            {
                debug!("Matched by address: {}", props.address);
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    async fn stop_scan_if_idle(&self) {
        if self.scanners.load(Ordering::SeqCst) == 0
            && let Err(e) = self.adapter.stop_scan().await
        {
            debug!("Failed to stop scan: {}", e);
        }
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Descriptor = Peripheral;
    type Connection = BtleConnection;

    async fn resolve_device(&self, address: &str) -> Result<Option<Peripheral>> {
        if let Some(peripheral) = self.find_known(address).await? {
            return Ok(Some(peripheral));
        }
        if self.config.lookup_scan.is_zero() {
            return Ok(None);
        }

        debug!(
            "{} not cached, scanning for {:?}",
            address, self.config.lookup_scan
        );
        self.adapter.start_scan(ScanFilter::default()).await?;
        sleep(self.config.lookup_scan).await;
        self.stop_scan_if_idle().await;
        self.find_known(address).await
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<BtleConnection> {
        peripheral.connect().await?;

        let discovered = timeout(self.config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))
            .and_then(|r| r.map_err(Error::from));
        if let Err(e) = discovered {
            let _ = peripheral.disconnect().await;
            return Err(e);
        }

        let characteristics: HashMap<Uuid, Characteristic> = peripheral
            .characteristics()
            .into_iter()
            .map(|c| (c.uuid, c))
            .collect();
        if !characteristics.contains_key(&COMMAND_CHARACTERISTIC) {
            let service_count = peripheral.services().len();
            let _ = peripheral.disconnect().await;
            return Err(Error::characteristic_not_found(
                COMMAND_CHARACTERISTIC.to_string(),
                service_count,
            ));
        }

        let address = match peripheral.properties().await {
            Ok(Some(props)) => create_identifier(&props.address.to_string(), &peripheral.id()),
            _ => format_peripheral_id(&peripheral.id()),
        };
        debug!("Cached {} characteristics for {}", characteristics.len(), address);

        Ok(BtleConnection {
            peripheral: peripheral.clone(),
            characteristics,
            address,
        })
    }
}

/// An open connection to a cover.
pub struct BtleConnection {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
    address: String,
}

impl std::fmt::Debug for BtleConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleConnection")
            .field("address", &self.address)
            .field("characteristics", &self.characteristics.len())
            .finish()
    }
}

#[async_trait]
impl Connection for BtleConnection {
    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn write_characteristic(
        &self,
        uuid: Uuid,
        data: &[u8],
        require_ack: bool,
    ) -> Result<()> {
        let characteristic = self.characteristics.get(&uuid).ok_or_else(|| {
            Error::characteristic_not_found(uuid.to_string(), self.peripheral.services().len())
        })?;
        let write_type = if require_ack {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral
            .write(characteristic, data, write_type)
            .await
            .map_err(|e| Error::write_failed(uuid, e.to_string()))
    }

    async fn disconnect(&self) -> Result<()> {
        debug!("Disconnecting from {}", self.address);
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Releases a scanner slot when the advertisement task ends.
struct ScannerSlot {
    transport: BtleTransport,
}

impl Drop for ScannerSlot {
    fn drop(&mut self) {
        self.transport.scanners.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Remove and return every address not heard from for `after`.
fn take_stale(last_seen: &mut HashMap<String, Instant>, after: Duration) -> Vec<String> {
    let stale: Vec<String> = last_seen
        .iter()
        .filter(|(_, seen)| seen.elapsed() >= after)
        .map(|(address, _)| address.clone())
        .collect();
    for address in &stale {
        last_seen.remove(address);
        debug!("No advertisement from {} for {:?}", address, after);
    }
    stale
}

/// Publish `Unavailable` for each address. Returns `false` once the
/// receiving side is gone.
async fn report_unavailable(tx: &mpsc::Sender<AdvertisementEvent>, stale: Vec<String>) -> bool {
    for address in stale {
        if tx.send(AdvertisementEvent::Unavailable { address }).await.is_err() {
            return false;
        }
    }
    true
}

#[async_trait]
impl AdvertisementSource for BtleTransport {
    async fn advertisements(
        &self,
        filter: &AdvertisementFilter,
    ) -> Result<BoxStream<'static, AdvertisementEvent>> {
        if filter.mode == ScanMode::Passive {
            debug!("Passive scanning is not selectable through btleplug; using the default mode");
        }

        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        self.scanners.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(64);
        let transport = self.clone();
        let filter = filter.clone();

        tokio::spawn(async move {
            let slot = ScannerSlot { transport };
            let period = (filter.unavailable_after / 4)
                .clamp(Duration::from_secs(1), Duration::from_secs(30));
            let mut ticker = interval(period);
            let mut last_seen: HashMap<String, Instant> = HashMap::new();

            'events: loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = events.next() => match event {
                        None => break,
                        Some(CentralEvent::ManufacturerDataAdvertisement { id, manufacturer_data }) => {
                            let Some(advertisement) =
                                to_advertisement(&slot.transport.adapter, &id, manufacturer_data).await
                            else {
                                continue;
                            };
                            if !filter.matches(&advertisement.address) {
                                continue;
                            }
                            last_seen.insert(advertisement.address.clone(), Instant::now());
                            if tx.send(AdvertisementEvent::Advertisement(advertisement)).await.is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                    },
                    _ = ticker.tick() => {
                        let stale = take_stale(&mut last_seen, filter.unavailable_after);
                        if !report_unavailable(&tx, stale).await {
                            break 'events;
                        }
                    }
                }
            }

            let transport = slot.transport.clone();
            drop(slot);
            transport.stop_scan_if_idle().await;
            debug!("Advertisement task ended");
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(stream.boxed())
    }
}

async fn to_advertisement(
    adapter: &Adapter,
    id: &PeripheralId,
    manufacturer_data: HashMap<u16, Vec<u8>>,
) -> Option<Advertisement> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let props = peripheral.properties().await.ok().flatten();
    let address = props
        .as_ref()
        .map(|p| create_identifier(&p.address.to_string(), id))
        .unwrap_or_else(|| format_peripheral_id(id));
    Some(Advertisement {
        address,
        name: props.as_ref().and_then(|p| p.local_name.clone()),
        rssi: props.as_ref().and_then(|p| p.rssi),
        manufacturer_data,
    })
}
