//! End-to-end tests with Zenoh pub/sub.
//!
//! These tests verify that property values travel through the object bus
//! using the service key layout.
//!
//! Note: Zenoh requires multi-thread tokio runtime.
//! Each test uses a unique key prefix to avoid interference.

use std::time::Duration;
use virtdev_common::{BusValue, ServiceKeys, ZenohConfig, connect, service_name};

/// Generate a unique test prefix to avoid test interference.
fn unique_prefix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test_{}", nanos)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_property_value_pubsub() {
    let prefix = unique_prefix();
    let keys = ServiceKeys::with_prefix(&prefix, service_name("tank", "1"));

    let session = connect(&ZenohConfig::default())
        .await
        .expect("Failed to open object bus session");

    let subscriber = session
        .declare_subscriber(format!("{}/**", prefix))
        .await
        .expect("Failed to create subscriber");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let payload = serde_json::to_vec(&BusValue::Float(50.0)).unwrap();
    session
        .put(keys.property("/Level"), payload)
        .await
        .expect("Failed to publish");

    let sample = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for sample")
        .expect("Failed to receive sample");

    assert_eq!(sample.key_expr().as_str(), keys.property("/Level"));
    let value: BusValue = serde_json::from_slice(&sample.payload().to_bytes()).unwrap();
    assert_eq!(value, BusValue::Float(50.0));

    drop(subscriber);
    session.close().await.expect("Failed to close session");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_request_key_maps_back_to_path() {
    let prefix = unique_prefix();
    let keys = ServiceKeys::with_prefix(&prefix, service_name("switch", "7"));

    let session = connect(&ZenohConfig::default())
        .await
        .expect("Failed to open object bus session");

    let subscriber = session
        .declare_subscriber(keys.set_wildcard())
        .await
        .expect("Failed to create subscriber");

    tokio::time::sleep(Duration::from_millis(100)).await;

    session
        .put(keys.set_key("/SwitchableOutput/output_2/State"), "1")
        .await
        .expect("Failed to publish");

    let sample = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for sample")
        .expect("Failed to receive sample");

    assert_eq!(
        keys.path_from_set_key(sample.key_expr().as_str()).as_deref(),
        Some("/SwitchableOutput/output_2/State")
    );
    let value: BusValue = serde_json::from_slice(&sample.payload().to_bytes()).unwrap();
    assert_eq!(value.as_i64(), Some(1));

    drop(subscriber);
    session.close().await.expect("Failed to close session");
}
