//! MQTT connection manager
//!
//! Split the same way as the rest of the transport: pure decision logic in
//! small modules, I/O in [`client`].
//!
//! - [`connection`] - states, reconnect policy, client options
//! - [`message_handler`] - event routing and subscription outcome pairing
//! - [`health_monitor`] - reconnection decisions and state transitions
//! - [`client`] - supervisor task and broker I/O
//!
//! # Usage
//!
//! ```rust,no_run
//! use counter_bridge::config::BridgeConfig;
//! use counter_bridge::transport::mqtt::MqttClient;
//! use counter_bridge::transport::MessageSink;
//! use std::sync::Arc;
//!
//! struct PrintSink;
//!
//! #[async_trait::async_trait]
//! impl MessageSink for PrintSink {
//!     async fn dispatch(&self, topic: &str, payload: &[u8]) {
//!         println!("{topic}: {} bytes", payload.len());
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let config = BridgeConfig::from_env()?;
//! let mut client = MqttClient::new(&config.bridge.device_id, &config.mqtt)?;
//! client.connect(Arc::new(PrintSink)).await?;
//! client.shutdown().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{
    configure_mqtt_options, parse_broker_url, BrokerAddress, ConnectionState, MqttError,
    ReconnectConfig,
};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler, SubscriptionOutcome};
