//! Mock implementations for testing
//!
//! In-memory store and transport so the bridge can be driven end to end
//! without a broker or a database.

use crate::protocol::ProductionRecord;
use crate::store::{Store, StoreError};
use crate::transport::mqtt::{ConnectionState, MqttError};
use crate::transport::{MessageSink, Transport};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Store that keeps inserted records in memory
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    records: Arc<Mutex<Vec<ProductionRecord>>>,
    attempts: Arc<AtomicUsize>,
    /// 1-based insert attempts that are rejected
    failing_attempts: Option<HashSet<usize>>,
    fail_all: bool,
    delay: Option<Duration>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every insert
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    /// Reject only the given insert attempts (1-based)
    pub fn failing_on(attempts: &[usize]) -> Self {
        Self {
            failing_attempts: Some(attempts.iter().copied().collect()),
            ..Default::default()
        }
    }

    /// Sleep before every insert
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Successfully stored records, in insert order
    pub fn records(&self) -> Vec<ProductionRecord> {
        lock(&self.records).clone()
    }

    pub fn insert_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MockStore {
    async fn insert(&self, record: ProductionRecord) -> Result<(), StoreError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let rejected = self.fail_all
            || self
                .failing_attempts
                .as_ref()
                .is_some_and(|attempts| attempts.contains(&attempt));
        if rejected {
            return Err(StoreError::Rejected {
                status: 503,
                body: "mock store unavailable".to_string(),
            });
        }

        lock(&self.records).push(record);
        Ok(())
    }
}

/// Transport that lets tests inject inbound publishes
///
/// Cloning shares state, so a test can keep a handle after moving the
/// transport into the bridge.
#[derive(Clone, Default)]
pub struct MockTransport {
    sink: Arc<Mutex<Option<Arc<dyn MessageSink>>>>,
    state: Arc<Mutex<Option<ConnectionState>>>,
    connect_calls: Arc<AtomicUsize>,
    shutdown_calls: Arc<AtomicUsize>,
    pub should_fail: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose connect never succeeds
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Deliver a publish to the connected sink; false if not connected
    pub async fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        let sink = lock(&self.sink).clone();
        match sink {
            Some(sink) => {
                sink.dispatch(topic, payload).await;
                true
            }
            None => false,
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self, sink: Arc<dyn MessageSink>) -> Result<(), Self::Error> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.sink) = Some(sink);

        if self.should_fail {
            *lock(&self.state) = Some(ConnectionState::Disconnected(
                "mock broker unreachable".to_string(),
            ));
            return Err(MqttError::ConnectionFailed(
                "mock broker unreachable".to_string(),
            ));
        }

        *lock(&self.state) = Some(ConnectionState::Connected);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Self::Error> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.sink) = None;
        *lock(&self.state) = Some(ConnectionState::Closed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(*lock(&self.state), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        lock(&self.state).clone()
    }
}
