//! End-to-end tests for broadcast position tracking and the cover facade.
//!
//! Run with `cargo test -p gira-core --test broadcast`.

use std::sync::Arc;
use std::time::Duration;

use gira_core::{
    ClientConfig, CoverEvent, CoverRegistry, Error, ListenerStatus, MockTransport,
    PassiveListener, PassiveListenerOptions,
};
use gira_types::DeviceIdentity;
use gira_types::protocol::BROADCAST_PREFIX;
use gira_types::uuids::MANUFACTURER_ID;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

fn payload(raw: u8) -> Vec<u8> {
    let mut data = vec![0x01, 0x02, 0x03];
    data.extend_from_slice(&BROADCAST_PREFIX);
    data.push(raw);
    data
}

async fn next_position(rx: &mut broadcast::Receiver<CoverEvent>) -> u8 {
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event within 5s")
            .expect("channel closed");
        if let CoverEvent::PositionChanged { position, .. } = event {
            return position.percent();
        }
    }
}

#[tokio::test]
async fn listener_reports_broadcast_position() {
    let transport = Arc::new(MockTransport::new());
    let listener = Arc::new(PassiveListener::new(
        DeviceIdentity::new(ADDRESS, "Bedroom"),
        PassiveListenerOptions::default(),
    ));
    let mut rx = listener.subscribe();
    let cancel = CancellationToken::new();
    let task = listener
        .start(Arc::clone(&transport), cancel.clone())
        .await
        .unwrap();

    transport.emit_manufacturer_data(ADDRESS, MANUFACTURER_ID, &payload(0x7A));
    assert_eq!(next_position(&mut rx).await, 52);

    transport.emit_manufacturer_data(ADDRESS, MANUFACTURER_ID, &payload(0xFF));
    assert_eq!(next_position(&mut rx).await, 0);

    let snapshot = listener.snapshot().await.unwrap();
    assert_eq!(snapshot.raw, 0xFF);
    assert!(!snapshot.stale);

    cancel.cancel();
    task.await.unwrap();
    assert_eq!(listener.status().await, ListenerStatus::Idle);
    assert_eq!(transport.scanner_count(), 0);
}

#[tokio::test]
async fn listener_ignores_foreign_traffic() {
    let transport = Arc::new(MockTransport::new());
    let listener = Arc::new(PassiveListener::new(
        DeviceIdentity::new(ADDRESS, "Bedroom"),
        PassiveListenerOptions::default(),
    ));
    let mut rx = listener.subscribe();
    let cancel = CancellationToken::new();
    let task = listener
        .start(Arc::clone(&transport), cancel.clone())
        .await
        .unwrap();

    // other device, other manufacturer, missing prefix, prefix without position
    transport.emit_manufacturer_data("11:22:33:44:55:66", MANUFACTURER_ID, &payload(0x00));
    transport.emit_manufacturer_data(ADDRESS, 76, &payload(0x00));
    transport.emit_manufacturer_data(ADDRESS, MANUFACTURER_ID, &[0xF7, 0x03, 0x20]);
    transport.emit_manufacturer_data(ADDRESS, MANUFACTURER_ID, &BROADCAST_PREFIX);
    // then a real one, lower-case address
    transport.emit_manufacturer_data(
        &ADDRESS.to_lowercase(),
        MANUFACTURER_ID,
        &payload(0x00),
    );

    assert_eq!(next_position(&mut rx).await, 100);
    assert!(rx.try_recv().is_err());

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn unavailable_marks_snapshot_stale() {
    let transport = Arc::new(MockTransport::new());
    let listener = Arc::new(PassiveListener::new(
        DeviceIdentity::new(ADDRESS, "Bedroom"),
        PassiveListenerOptions::default().deduplicate(true),
    ));
    let mut rx = listener.subscribe();
    let cancel = CancellationToken::new();
    let task = listener
        .start(Arc::clone(&transport), cancel.clone())
        .await
        .unwrap();

    transport.emit_manufacturer_data(ADDRESS, MANUFACTURER_ID, &payload(0x80));
    assert_eq!(next_position(&mut rx).await, 50);

    transport.emit_unavailable(ADDRESS);
    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, CoverEvent::Unavailable { .. }));
    assert_eq!(listener.status().await, ListenerStatus::Unavailable);
    assert!(listener.snapshot().await.unwrap().stale);

    // same raw value is republished once the device comes back
    transport.emit_manufacturer_data(ADDRESS, MANUFACTURER_ID, &payload(0x80));
    assert_eq!(next_position(&mut rx).await, 50);
    assert_eq!(listener.status().await, ListenerStatus::Listening);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn registry_cover_tracks_position_and_commands() {
    let transport = Arc::new(MockTransport::new().with_device(ADDRESS));
    let registry = CoverRegistry::new(
        Arc::clone(&transport),
        ClientConfig::default(),
        PassiveListenerOptions::default(),
    );
    let cover = registry
        .add(DeviceIdentity::new(ADDRESS, "Office"))
        .await
        .unwrap();
    let mut rx = cover.subscribe();

    assert_eq!(cover.current_position().await, None);
    transport.emit_manufacturer_data(ADDRESS, MANUFACTURER_ID, &payload(0xFF));
    assert_eq!(next_position(&mut rx).await, 0);
    assert_eq!(cover.is_closed().await, Some(true));

    cover.set_position(42).await.unwrap();
    let writes = transport.writes();
    assert_eq!(
        writes.last().unwrap().0,
        vec![0xF6, 0x03, 0x20, 0x01, 0xFC, 0x10, 0x01, 0x2A]
    );
    assert!(cover.is_available());

    registry.shutdown().await;
    assert_eq!(transport.scanner_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_command_marks_cover_unavailable() {
    let transport = Arc::new(MockTransport::new().with_device(ADDRESS));
    let registry = CoverRegistry::new(
        Arc::clone(&transport),
        ClientConfig::default().connect_attempts(2),
        PassiveListenerOptions::default(),
    );
    let cover = registry
        .add(DeviceIdentity::new(ADDRESS, "Office"))
        .await
        .unwrap();

    transport.set_connect_failures(u32::MAX);
    let err = cover.close().await.unwrap_err();
    assert!(matches!(err, Error::CommandFailed { .. }));
    assert!(!cover.is_available());

    transport.set_connect_failures(0);
    cover.open().await.unwrap();
    assert!(cover.is_available());

    registry.shutdown().await;
}
