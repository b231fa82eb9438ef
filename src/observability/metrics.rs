//! Thread-safe metrics collection
//!
//! Atomic counters for the ingestion path, readable as a serializable
//! snapshot by the health server and in tests.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Sentinel stored in `last_rate_bits` while no rate has been derived
const NO_RATE: u64 = u64::MAX;

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Message flow
    messages_received: AtomicU64,
    readings_queued: AtomicU64,
    readings_processed: AtomicU64,
    malformed_payloads: AtomicU64,
    status_events: AtomicU64,
    ignored_messages: AtomicU64,

    // Store gateway
    records_stored: AtomicU64,
    store_failures: AtomicU64,
    store_timeouts: AtomicU64,
    last_rate_bits: AtomicU64,

    // MQTT
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connections_lost: AtomicU64,
    subscription_failures: AtomicU64,

    // Lifecycle
    bridge_state: Mutex<String>,
    uptime_start: AtomicU64,
    last_reading_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            readings_queued: AtomicU64::new(0),
            readings_processed: AtomicU64::new(0),
            malformed_payloads: AtomicU64::new(0),
            status_events: AtomicU64::new(0),
            ignored_messages: AtomicU64::new(0),
            records_stored: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            store_timeouts: AtomicU64::new(0),
            last_rate_bits: AtomicU64::new(NO_RATE),
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
            subscription_failures: AtomicU64::new(0),
            bridge_state: Mutex::new("initializing".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
            last_reading_at: AtomicU64::new(0),
        }
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reading_queued(&self) {
        self.readings_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// A reading went through rate derivation; `rate` is what it produced
    pub fn reading_processed(&self, rate: Option<f64>) {
        self.readings_processed.fetch_add(1, Ordering::Relaxed);
        self.last_reading_at
            .store(current_timestamp(), Ordering::Relaxed);
        if let Some(rate) = rate {
            self.last_rate_bits.store(rate.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn malformed_payload(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status_event(&self) {
        self.status_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_ignored(&self) {
        self.ignored_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stored(&self) {
        self.records_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_failed(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_timed_out(&self) {
        self.store_timeouts.fetch_add(1, Ordering::Relaxed);
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        if self.mqtt_connected.swap(false, Ordering::Relaxed) {
            self.connections_lost.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Session ended by our own shutdown; not counted as a lost connection
    pub fn mqtt_session_closed(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
    }

    pub fn subscription_failed(&self) {
        self.subscription_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_mqtt_connected(&self) -> bool {
        self.mqtt_connected.load(Ordering::Relaxed)
    }

    pub fn set_bridge_state(&self, state: &str) {
        if let Ok(mut current) = self.bridge_state.lock() {
            *current = state.to_string();
        }
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let last_rate_bits = self.last_rate_bits.load(Ordering::Relaxed);
        let bridge_state = self
            .bridge_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            timestamp: current_timestamp(),
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                readings_queued: self.readings_queued.load(Ordering::Relaxed),
                readings_processed: self.readings_processed.load(Ordering::Relaxed),
                malformed: self.malformed_payloads.load(Ordering::Relaxed),
                status_events: self.status_events.load(Ordering::Relaxed),
                ignored: self.ignored_messages.load(Ordering::Relaxed),
                last_reading_at: self.last_reading_at.load(Ordering::Relaxed),
            },
            store: StoreMetrics {
                records_stored: self.records_stored.load(Ordering::Relaxed),
                failures: self.store_failures.load(Ordering::Relaxed),
                timeouts: self.store_timeouts.load(Ordering::Relaxed),
                last_bags_per_minute: (last_rate_bits != NO_RATE)
                    .then(|| f64::from_bits(last_rate_bits)),
            },
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connections_lost: self.connections_lost.load(Ordering::Relaxed),
                subscription_failures: self.subscription_failures.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                state: bridge_state,
                started_at: self.uptime_start.load(Ordering::Relaxed),
            },
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub messages: MessageMetrics,
    pub store: StoreMetrics,
    pub mqtt: MqttMetrics,
    pub lifecycle: LifecycleMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub readings_queued: u64,
    pub readings_processed: u64,
    pub malformed: u64,
    pub status_events: u64,
    pub ignored: u64,
    pub last_reading_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreMetrics {
    pub records_stored: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub last_bags_per_minute: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connections_lost: u64,
    pub subscription_failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleMetrics {
    pub state: String,
    pub started_at: u64,
}

pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_counters() {
        let collector = MetricsCollector::new();

        collector.message_received();
        collector.message_received();
        collector.reading_queued();
        collector.malformed_payload();
        collector.status_event();
        collector.message_ignored();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.messages.received, 2);
        assert_eq!(snapshot.messages.readings_queued, 1);
        assert_eq!(snapshot.messages.malformed, 1);
        assert_eq!(snapshot.messages.status_events, 1);
        assert_eq!(snapshot.messages.ignored, 1);
    }

    #[test]
    fn test_last_rate_tracking() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.get_metrics().store.last_bags_per_minute, None);

        collector.reading_processed(Some(60.0));
        collector.reading_processed(None);

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.messages.readings_processed, 2);
        assert_eq!(snapshot.store.last_bags_per_minute, Some(60.0));
        assert!(snapshot.messages.last_reading_at > 0);
    }

    #[test]
    fn test_store_timeouts_count_as_failures() {
        let collector = MetricsCollector::new();

        collector.store_failed();
        collector.store_timed_out();
        collector.record_stored();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.store.failures, 2);
        assert_eq!(snapshot.store.timeouts, 1);
        assert_eq!(snapshot.store.records_stored, 1);
    }

    #[test]
    fn test_connection_lost_counted_once() {
        let collector = MetricsCollector::new();

        collector.mqtt_connection_attempt();
        collector.mqtt_connection_established();
        assert!(collector.is_mqtt_connected());

        collector.mqtt_connection_lost();
        collector.mqtt_connection_lost();

        let snapshot = collector.get_metrics();
        assert!(!snapshot.mqtt.connected);
        assert_eq!(snapshot.mqtt.connection_attempts, 1);
        assert_eq!(snapshot.mqtt.connections_established, 1);
        assert_eq!(snapshot.mqtt.connections_lost, 1);
    }

    #[test]
    fn test_session_closed_clears_connected_without_loss() {
        let collector = MetricsCollector::new();

        collector.mqtt_connection_established();
        collector.mqtt_session_closed();

        let snapshot = collector.get_metrics();
        assert!(!snapshot.mqtt.connected);
        assert_eq!(snapshot.mqtt.connections_lost, 0);
    }

    #[test]
    fn test_bridge_state() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.get_metrics().lifecycle.state, "initializing");

        collector.set_bridge_state("running");
        assert_eq!(collector.get_metrics().lifecycle.state, "running");
    }
}
