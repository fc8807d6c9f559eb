//! Mock transport implementation for testing.
//!
//! This module provides a mock BLE stack that can be used for unit testing
//! without requiring actual hardware.
//!
//! [`MockTransport`] implements both [`Transport`] and
//! [`AdvertisementSource`], so the same instance can back a
//! [`CoverClient`](crate::client::CoverClient) and a
//! [`PassiveListener`](crate::passive::PassiveListener).
//!
//! # Features
//!
//! - **Call recording**: every resolve, connect, write and disconnect is logged
//! - **Failure injection**: fail a number of connects or writes
//! - **Latency simulation**: delay connects and writes to exercise timeouts
//! - **Advertisement injection**: push raw advertisement events to listeners

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
use crate::transport::{
    Advertisement, AdvertisementEvent, AdvertisementFilter, AdvertisementSource, Connection,
    Transport,
};

/// One recorded interaction with the mock stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `resolve_device` was called.
    Resolve { address: String },
    /// `connect` was called.
    Connect { address: String },
    /// `write_characteristic` was called.
    Write {
        address: String,
        uuid: Uuid,
        data: Vec<u8>,
        require_ack: bool,
    },
    /// `disconnect` was called.
    Disconnect { address: String },
}

struct MockState {
    devices: Mutex<Vec<String>>,
    calls: Mutex<Vec<TransportCall>>,
    filters: Mutex<Vec<AdvertisementFilter>>,
    advertisements: broadcast::Sender<AdvertisementEvent>,
    links: Mutex<Vec<Arc<AtomicBool>>>,
    open_connections: AtomicU32,
    max_open_connections: AtomicU32,
    connect_failures: AtomicU32,
    write_failures: AtomicU32,
    no_adapter: AtomicBool,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    /// Simulated write latency in milliseconds (0 = no delay).
    write_latency_ms: AtomicU64,
}

/// A mock BLE stack for testing.
///
/// Cloning is cheap and clones share all state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gira_core::{ClientConfig, CoverClient, MockTransport};
/// use gira_types::DeviceIdentity;
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::new().with_device("AA:BB:CC:DD:EE:FF");
///     let client = CoverClient::new(
///         DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "Bedroom"),
///         Arc::new(transport.clone()),
///         ClientConfig::default(),
///     );
///
///     client.stop().await.unwrap();
///     assert_eq!(transport.write_count(), 1);
/// }
/// ```
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("devices", &*lock(&self.state.devices))
            .field("calls", &lock(&self.state.calls).len())
            .field(
                "open_connections",
                &self.state.open_connections.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned mutex only means another test thread panicked; the data is
// still usable for assertions.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockTransport {
    /// Create an empty mock stack with no known devices.
    pub fn new() -> Self {
        let (advertisements, _) = broadcast::channel(64);
        Self {
            state: Arc::new(MockState {
                devices: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                filters: Mutex::new(Vec::new()),
                advertisements,
                links: Mutex::new(Vec::new()),
                open_connections: AtomicU32::new(0),
                max_open_connections: AtomicU32::new(0),
                connect_failures: AtomicU32::new(0),
                write_failures: AtomicU32::new(0),
                no_adapter: AtomicBool::new(false),
                connect_latency_ms: AtomicU64::new(0),
                write_latency_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Make `address` resolvable.
    #[must_use]
    pub fn with_device(self, address: &str) -> Self {
        self.add_device(address);
        self
    }

    /// Make `address` resolvable.
    pub fn add_device(&self, address: &str) {
        lock(&self.state.devices).push(address.to_string());
    }

    /// Make `address` unresolvable again.
    pub fn remove_device(&self, address: &str) {
        lock(&self.state.devices).retain(|a| !a.eq_ignore_ascii_case(address));
    }

    // --- Failure injection ---

    /// Fail the next `count` connection attempts.
    pub fn set_connect_failures(&self, count: u32) {
        self.state.connect_failures.store(count, Ordering::Relaxed);
    }

    /// Fail the next `count` writes.
    pub fn set_write_failures(&self, count: u32) {
        self.state.write_failures.store(count, Ordering::Relaxed);
    }

    /// Simulate a missing Bluetooth adapter.
    pub fn set_no_adapter(&self, missing: bool) {
        self.state.no_adapter.store(missing, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.state
            .connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated write latency.
    pub fn set_write_latency(&self, latency: Duration) {
        self.state
            .write_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Drop every open link as if the device went out of range.
    ///
    /// Connections report `is_connected() == false` afterwards; no
    /// disconnect call is recorded.
    pub fn drop_links(&self) {
        for link in lock(&self.state.links).drain(..) {
            if link.swap(false, Ordering::SeqCst) {
                self.state.open_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    // --- Advertisement injection ---

    /// Push an event to every active advertisement stream.
    pub fn emit(&self, event: AdvertisementEvent) {
        let _ = self.state.advertisements.send(event);
    }

    /// Push an advertisement carrying manufacturer data.
    pub fn emit_manufacturer_data(&self, address: &str, company_id: u16, data: &[u8]) {
        self.emit(AdvertisementEvent::Advertisement(
            Advertisement::with_manufacturer_data(address, company_id, data),
        ));
    }

    /// Report `address` as gone.
    pub fn emit_unavailable(&self, address: &str) {
        self.emit(AdvertisementEvent::Unavailable {
            address: address.to_string(),
        });
    }

    /// Number of active advertisement streams.
    pub fn scanner_count(&self) -> usize {
        self.state.advertisements.receiver_count()
    }

    /// Filters passed to `advertisements`, in call order.
    pub fn filters(&self) -> Vec<AdvertisementFilter> {
        lock(&self.state.filters).clone()
    }

    // --- Inspection ---

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.state.calls).clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }

    /// Payloads written, with their acknowledgment flag.
    pub fn writes(&self) -> Vec<(Vec<u8>, bool)> {
        lock(&self.state.calls)
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write {
                    data, require_ack, ..
                } => Some((data.clone(), *require_ack)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, matches: impl Fn(&TransportCall) -> bool) -> usize {
        lock(&self.state.calls).iter().filter(|c| matches(c)).count()
    }

    /// Number of `resolve_device` calls.
    pub fn resolve_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Resolve { .. }))
    }

    /// Number of connection attempts.
    pub fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Connect { .. }))
    }

    /// Number of write attempts.
    pub fn write_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Write { .. }))
    }

    /// Number of disconnect calls.
    pub fn disconnect_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Disconnect { .. }))
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> u32 {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections seen.
    pub fn max_open_connections(&self) -> u32 {
        self.state.max_open_connections.load(Ordering::SeqCst)
    }

    fn record(&self, call: TransportCall) {
        lock(&self.state.calls).push(call);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

async fn simulate_latency(ms: &AtomicU64) {
    let latency = ms.load(Ordering::Relaxed);
    if latency > 0 {
        tokio::time::sleep(Duration::from_millis(latency)).await;
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Descriptor = String;
    type Connection = MockConnection;

    async fn resolve_device(&self, address: &str) -> Result<Option<String>> {
        self.record(TransportCall::Resolve {
            address: address.to_string(),
        });
        if self.state.no_adapter.load(Ordering::Relaxed) {
            return Err(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter));
        }
        Ok(lock(&self.state.devices)
            .iter()
            .find(|known| known.eq_ignore_ascii_case(address))
            .cloned())
    }

    async fn connect(&self, descriptor: &String) -> Result<MockConnection> {
        self.record(TransportCall::Connect {
            address: descriptor.clone(),
        });
        simulate_latency(&self.state.connect_latency_ms).await;

        if Self::take_failure(&self.state.connect_failures) {
            return Err(Error::connection_failed(
                Some(descriptor.clone()),
                ConnectionFailureReason::OutOfRange,
            ));
        }

        let link = Arc::new(AtomicBool::new(true));
        lock(&self.state.links).push(Arc::clone(&link));
        let open = self.state.open_connections.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_open_connections
            .fetch_max(open, Ordering::SeqCst);

        Ok(MockConnection {
            address: descriptor.clone(),
            link,
            transport: self.clone(),
        })
    }
}

#[async_trait]
impl AdvertisementSource for MockTransport {
    async fn advertisements(
        &self,
        filter: &AdvertisementFilter,
    ) -> Result<BoxStream<'static, AdvertisementEvent>> {
        lock(&self.state.filters).push(filter.clone());
        if self.state.no_adapter.load(Ordering::Relaxed) {
            return Err(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter));
        }

        let receiver = self.state.advertisements.subscribe();
        let filter = filter.clone();
        let events = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |event| futures::future::ready(filter.matches(event.address())));

        Ok(events.boxed())
    }
}

/// A connection handed out by [`MockTransport`].
pub struct MockConnection {
    address: String,
    link: Arc<AtomicBool>,
    transport: MockTransport,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("address", &self.address)
            .field("connected", &self.link.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn is_connected(&self) -> bool {
        self.link.load(Ordering::SeqCst)
    }

    async fn write_characteristic(
        &self,
        uuid: Uuid,
        data: &[u8],
        require_ack: bool,
    ) -> Result<()> {
        self.transport.record(TransportCall::Write {
            address: self.address.clone(),
            uuid,
            data: data.to_vec(),
            require_ack,
        });
        simulate_latency(&self.transport.state.write_latency_ms).await;

        if !self.link.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        if MockTransport::take_failure(&self.transport.state.write_failures) {
            return Err(Error::write_failed(uuid, "mock write failure"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.transport.record(TransportCall::Disconnect {
            address: self.address.clone(),
        });
        if self.link.swap(false, Ordering::SeqCst) {
            self.transport
                .state
                .open_connections
                .fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
