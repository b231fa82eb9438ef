//! Transport layer for device telemetry
//!
//! The bridge talks to the broker through the [`Transport`] trait so the
//! wiring can be exercised without a live broker. Inbound publishes are
//! handed to a [`MessageSink`].

use std::sync::Arc;

pub mod mqtt;

/// Receiver of inbound publishes
///
/// Called inline from the transport's event loop, once per message, in
/// arrival order.
#[async_trait::async_trait]
pub trait MessageSink: Send + Sync {
    async fn dispatch(&self, topic: &str, payload: &[u8]);
}

/// Transport trait for the broker connection
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start the connection and deliver inbound publishes to `sink`
    async fn connect(&mut self, sink: Arc<dyn MessageSink>) -> Result<(), Self::Error>;

    /// Unsubscribe, disconnect and stop reconnecting
    async fn shutdown(&mut self) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;

    /// Current connection state; None before `connect`
    fn connection_state(&self) -> Option<mqtt::ConnectionState>;
}
