//! Topic router: classify an inbound message and hand it to its handler
//!
//! Production-data readings are parsed here and queued for the pipeline, so a
//! malformed payload never reaches the rate state. Status messages are
//! handled inline and only logged.

use crate::error::{BridgeError, BridgeResult};
use crate::observability::metrics;
use crate::protocol::{
    normalize_topic, DeviceStatusEvent, PayloadError, Reading, TopicKind, TopicMarkers,
};
use crate::transport::MessageSink;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What the router did with one message
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Reading parsed and queued for the pipeline
    Queued,
    /// Status message parsed and logged
    Status(DeviceStatusEvent),
    /// Payload failed to parse; dropped
    Malformed,
    /// Unrecognized topic or empty payload; dropped silently
    Ignored,
    /// Pipeline no longer accepts readings (shutdown in progress)
    PipelineClosed,
}

pub struct TopicRouter {
    markers: TopicMarkers,
    readings: mpsc::Sender<Reading>,
}

impl TopicRouter {
    pub fn new(markers: TopicMarkers, readings: mpsc::Sender<Reading>) -> Self {
        Self { markers, readings }
    }

    /// Classify and handle one message
    ///
    /// Waits when the pipeline queue is full so arrival order is preserved.
    pub async fn route(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        metrics().message_received();
        let topic = normalize_topic(topic);

        let outcome = match self.markers.classify(&topic) {
            TopicKind::DeviceStatus => self.handle_status(&topic, payload),
            TopicKind::ProductionData => self.handle_data(&topic, payload).await,
            TopicKind::Unrecognized => {
                debug!(topic = %topic, "Ignoring message on unrecognized topic");
                DispatchOutcome::Ignored
            }
        };

        if outcome == DispatchOutcome::Ignored {
            metrics().message_ignored();
        }
        outcome
    }

    fn handle_status(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        match parse_payload(payload, DeviceStatusEvent::parse) {
            Ok(event) => {
                metrics().status_event();
                info!(
                    topic = %topic,
                    status = %event.status,
                    name = %event.name,
                    mac_address = %event.mac_address,
                    ip_address = %event.ip_address,
                    "Device status"
                );
                DispatchOutcome::Status(event)
            }
            Err(e) => Self::reject(topic, e),
        }
    }

    async fn handle_data(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        if payload.is_empty() {
            debug!(topic = %topic, "Ignoring empty production-data payload");
            return DispatchOutcome::Ignored;
        }

        let reading = match parse_payload(payload, Reading::parse) {
            Ok(reading) => reading,
            Err(e) => return Self::reject(topic, e),
        };

        debug!(
            topic = %topic,
            device_timestamp = %reading.device_timestamp,
            counter1 = reading.counter1,
            "Queueing reading"
        );

        match self.readings.send(reading).await {
            Ok(()) => {
                metrics().reading_queued();
                DispatchOutcome::Queued
            }
            Err(_) => {
                warn!(topic = %topic, "Pipeline closed, dropping reading");
                DispatchOutcome::PipelineClosed
            }
        }
    }

    fn reject(topic: &str, error: BridgeError) -> DispatchOutcome {
        metrics().malformed_payload();
        match &error {
            BridgeError::MalformedPayload { reason, raw } => {
                warn!(topic = %topic, reason = %reason, raw_payload = %raw, "Dropping malformed payload");
            }
            other => warn!(topic = %topic, error = %other, "Dropping message"),
        }
        DispatchOutcome::Malformed
    }
}

/// Parse a payload, attaching the raw bytes to any failure
fn parse_payload<T>(
    payload: &[u8],
    parse: impl FnOnce(&[u8]) -> Result<T, PayloadError>,
) -> BridgeResult<T> {
    parse(payload).map_err(|e| BridgeError::malformed(e, payload))
}

#[async_trait]
impl MessageSink for TopicRouter {
    async fn dispatch(&self, topic: &str, payload: &[u8]) {
        self.route(topic, payload).await;
    }
}
