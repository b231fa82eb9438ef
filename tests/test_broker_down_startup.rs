//! Startup and shutdown against a broker that is not there
//!
//! The client must keep retrying at the fixed delay without failing, and
//! must stop retrying for good once it has been shut down.

use counter_bridge::config::BridgeConfig;
use counter_bridge::observability::metrics;
use counter_bridge::transport::mqtt::{ConnectionState, MqttClient};
use counter_bridge::transport::{MessageSink, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

struct NullSink;

#[async_trait::async_trait]
impl MessageSink for NullSink {
    async fn dispatch(&self, _topic: &str, _payload: &[u8]) {}
}

fn unreachable_broker_config() -> BridgeConfig {
    BridgeConfig::from_toml_str(
        r#"
[bridge]
device_id = "counter-01"

[mqtt]
broker_url = "mqtt://127.0.0.1:1"
data_topic = "plant/counter-01/data"
status_topic = "plant/counter-01/status"
reconnect_delay_ms = 100

[store]
url = "http://localhost:54321"
"#,
    )
    .expect("config is valid")
}

#[tokio::test]
async fn test_retries_at_fixed_delay_then_stops_once_closed() {
    let config = unreachable_broker_config();
    let mut client = MqttClient::new(&config.bridge.device_id, &config.mqtt)
        .expect("client creation succeeds while the broker is down");
    assert_eq!(client.reconnect_config().delay_ms, 100);

    // Connect never completes; the supervisor keeps retrying in the background
    let connect_result = timeout(Duration::from_secs(1), client.connect(Arc::new(NullSink))).await;
    assert!(connect_result.is_err() || connect_result.unwrap().is_err());

    match client.connection_state() {
        // One attempt per 100 ms delay at most
        Some(ConnectionState::Reconnecting(attempt)) => {
            assert!(attempt > 1, "expected several attempts, got {attempt}");
            assert!(attempt <= 11, "retried faster than the fixed delay: {attempt}");
        }
        other => panic!("expected Reconnecting, got {other:?}"),
    }
    assert!(!client.is_connected());

    // Pretend a session had been up so shutdown has to clear it
    metrics().mqtt_connection_established();
    Transport::shutdown(&mut client)
        .await
        .expect("shutdown succeeds");

    assert_eq!(client.connection_state(), Some(ConnectionState::Closed));
    assert!(!metrics().is_mqtt_connected());

    let attempts = metrics().get_metrics().mqtt.connection_attempts;
    sleep(Duration::from_millis(500)).await;
    assert_eq!(metrics().get_metrics().mqtt.connection_attempts, attempts);
    assert_eq!(client.connection_state(), Some(ConnectionState::Closed));
}
