//! Live broker round-trip tests.
//!
//! Run with: cargo test -p fleet-transport --test broker_test -- --ignored
//! Requires an MQTT broker (e.g. mosquitto) at FLEET_TEST_BROKER_URL.

use chrono::Utc;
use fleet_core::{LocationSample, MessageKind};
use fleet_transport::{
    subscription_filter, topic_for, ConnectionStatus, MessageDispatcher, QosLevel,
    SubscribeOptions, TransportClient, TransportOptions,
};
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn broker_url() -> String {
    std::env::var("FLEET_TEST_BROKER_URL").unwrap_or_else(|_| "mqtt://localhost:1883".to_string())
}

fn client(id: &str) -> TransportClient {
    TransportClient::new(TransportOptions::from_url(&broker_url(), id).unwrap())
}

fn sample(vehicle_id: &str) -> LocationSample {
    LocationSample {
        vehicle_id: vehicle_id.to_string(),
        latitude: 33.6846,
        longitude: -117.8265,
        altitude: 80.0,
        speed: 9.0,
        heading: 45.0,
        battery_level: 91.0,
        satellite_count: 14,
        timestamp: Utc::now(),
        additional_fields: Map::new(),
    }
}

#[tokio::test]
#[ignore]
async fn test_published_location_reaches_dispatcher() {
    let prefix = format!("fleet-test-{}", std::process::id());
    let subscriber = client("fleet-test-sub");
    let publisher = client("fleet-test-pub");

    let dispatcher = Arc::new(MessageDispatcher::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher.on_location(move |sample| {
        let _ = tx.send(sample.clone());
    });
    dispatcher.attach(&subscriber);

    subscriber.connect().await.unwrap();
    assert_eq!(subscriber.status(), ConnectionStatus::Connected);
    subscriber
        .subscribe(
            &subscription_filter(&prefix, MessageKind::Location),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

    publisher.connect().await.unwrap();
    // Give the SUBACK a moment before publishing.
    tokio::time::sleep(Duration::from_millis(300)).await;
    publisher
        .publish_json(
            &topic_for(&prefix, "DRONE-IT", MessageKind::Location),
            &sample("DRONE-IT"),
            QosLevel::AtLeastOnce,
        )
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no location within 5s")
        .unwrap();
    assert_eq!(received.vehicle_id, "DRONE-IT");
    assert_eq!(dispatcher.stats().delivered, 1);

    publisher.disconnect().await.unwrap();
    subscriber.disconnect().await.unwrap();
    assert_eq!(subscriber.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
#[ignore]
async fn test_malformed_publish_is_dropped() {
    let prefix = format!("fleet-test-bad-{}", std::process::id());
    let subscriber = client("fleet-test-bad-sub");
    let dispatcher = Arc::new(MessageDispatcher::new());
    dispatcher.attach(&subscriber);

    subscriber.connect().await.unwrap();
    subscriber
        .subscribe(
            &subscription_filter(&prefix, MessageKind::Location),
            SubscribeOptions::qos(QosLevel::AtMostOnce),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    subscriber
        .publish(
            &topic_for(&prefix, "D1", MessageKind::Location),
            r#"{"vehicleId":"D1"}"#,
            QosLevel::AtLeastOnce,
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stats = dispatcher.stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.rejected, 1);
    subscriber.disconnect().await.unwrap();
}
