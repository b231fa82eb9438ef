//! Pure connection state management for the MQTT client
//!
//! Connection states, the fixed-delay reconnect policy, transport errors and
//! construction of client options from configuration.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Connection state for the MQTT client
///
/// `Disconnected -> Connecting -> Connected -> Disconnected -> Reconnecting -> Connected ...`
/// until an explicit shutdown moves the client to `Closed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Transport down, with reason
    Disconnected(String),
    /// First connection attempt in progress
    Connecting,
    /// ConnAck received; subscriptions issued
    Connected,
    /// Waiting out the fixed delay before reconnect attempt N
    Reconnecting(u32),
    /// Shut down on request; no further reconnects
    Closed,
}

/// Reconnection policy: a fixed delay between attempts
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before every reconnect attempt
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 5000,
        }
    }
}

impl ReconnectConfig {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("No ConnAck within {0:?}")]
    ConnAckTimeout(Duration),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Broker address resolved from a broker URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `mqtt://`, `tcp://`, `mqtts://` or `ssl://` broker URLs
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerAddress, MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtts" | "ssl" => true,
        "mqtt" | "tcp" => false,
        _ => return Err(MqttError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Build client options from configuration
///
/// Credentials are read from the environment variables the config names.
pub fn configure_mqtt_options(
    device_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let address = parse_broker_url(&config.broker_url)?;

    // Unique per process so a restarted bridge never collides with its old session
    let client_id = format!("bridge-{device_id}-{}", Uuid::new_v4().simple());
    let mut mqtt_options = MqttOptions::new(client_id, address.host, address.port);

    if address.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.username() {
        mqtt_options.set_credentials(username, config.password().unwrap_or_default());
    }

    mqtt_options.set_keep_alive(config.keep_alive());
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}
