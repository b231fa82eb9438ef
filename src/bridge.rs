//! Bridge lifecycle
//!
//! Wires transport -> router -> queue -> pipeline -> store and owns the
//! graceful shutdown order: stop the transport, close the queue, let the
//! pipeline drain.

use crate::config::BridgeConfig;
use crate::lifecycle_span;
use crate::observability::metrics;
use crate::processing::{ProductionPipeline, TopicRouter};
use crate::protocol::TopicMarkers;
use crate::store::Store;
use crate::transport::{MessageSink, Transport};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

/// Upper bound on waiting for queued readings after the transport stops
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Bridge already started")]
    AlreadyStarted,
    #[error("Bridge not started")]
    NotStarted,
}

/// Running bridge with an injected transport and store
pub struct BridgeLifecycle<T>
where
    T: Transport + 'static,
{
    config: BridgeConfig,
    transport: T,
    store: Arc<dyn Store>,
    router: Option<Arc<TopicRouter>>,
    pipeline_handle: Option<JoinHandle<()>>,
}

impl<T> BridgeLifecycle<T>
where
    T: Transport + 'static,
{
    pub fn new(config: BridgeConfig, transport: T, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            transport,
            store,
            router: None,
            pipeline_handle: None,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.config.bridge.device_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_running(&self) -> bool {
        self.pipeline_handle.is_some()
    }

    /// Start the pipeline task, then connect the transport
    ///
    /// A transport that cannot connect yet is logged and left retrying;
    /// it does not fail startup.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        if self.pipeline_handle.is_some() {
            return Err(LifecycleError::AlreadyStarted);
        }

        let span = lifecycle_span!(device_id = %self.config.bridge.device_id, phase = "start");
        metrics().set_bridge_state("starting");

        let (readings_tx, readings_rx) = mpsc::channel(self.config.mqtt.queue_capacity);
        let pipeline = ProductionPipeline::new(
            self.store.clone(),
            self.config.bridge.device_id.clone(),
            self.config.store.insert_timeout(),
        );
        self.pipeline_handle = Some(tokio::spawn(
            pipeline.run(readings_rx).instrument(span.clone()),
        ));

        let markers = TopicMarkers::new(
            self.config.mqtt.data_suffix.clone(),
            self.config.mqtt.status_suffix.clone(),
        );
        let router = Arc::new(TopicRouter::new(markers, readings_tx));
        self.router = Some(router.clone());

        let sink: Arc<dyn MessageSink> = router;
        match self.transport.connect(sink).instrument(span).await {
            Ok(()) => info!(
                device_id = %self.config.bridge.device_id,
                topics = ?self.config.mqtt.subscription_topics(),
                "Bridge running"
            ),
            Err(e) => warn!(
                error = %e,
                "Broker not reachable yet, continuing to retry in the background"
            ),
        }

        metrics().set_bridge_state("running");
        Ok(())
    }

    /// Stop the transport, close the queue and wait for the pipeline to drain
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        let handle = self
            .pipeline_handle
            .take()
            .ok_or(LifecycleError::NotStarted)?;

        let span = lifecycle_span!(device_id = %self.config.bridge.device_id, phase = "shutdown");
        metrics().set_bridge_state("stopping");

        if let Err(e) = self.transport.shutdown().instrument(span).await {
            error!(error = %e, "Transport shutdown failed");
        }

        // Last sender handle; the queue closes once the transport released its copy
        self.router = None;

        let mut handle = handle;
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => info!("Pipeline drained"),
            Ok(Err(e)) => error!(error = %e, "Pipeline task failed"),
            Err(_) => {
                warn!("Pipeline did not drain in time, abandoning queued readings");
                handle.abort();
            }
        }

        metrics().set_bridge_state("stopped");
        Ok(())
    }

    /// Start, wait for `shutdown_signal`, then shut down
    pub async fn run_until<F>(&mut self, shutdown_signal: F) -> Result<(), LifecycleError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown_signal.await;
        info!("Shutdown requested");
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockStore, MockTransport};
    use crate::transport::mqtt::ConnectionState;

    const READING: &[u8] = br#"{"t":"2024-01-01T00:00:00Z","di1":100,"di2":1,"di3":0,"di4":0}"#;

    fn bridge(
        transport: MockTransport,
        store: &Arc<MockStore>,
    ) -> BridgeLifecycle<MockTransport> {
        let store: Arc<dyn Store> = store.clone();
        BridgeLifecycle::new(BridgeConfig::test_config(), transport, store)
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let store = Arc::new(MockStore::new());
        let mut bridge = bridge(MockTransport::new(), &store);

        bridge.start().await.unwrap();
        assert!(matches!(
            bridge.start().await,
            Err(LifecycleError::AlreadyStarted)
        ));
        bridge.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let store = Arc::new(MockStore::new());
        let mut bridge = bridge(MockTransport::new(), &store);

        assert!(matches!(
            bridge.shutdown().await,
            Err(LifecycleError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_broker_does_not_fail_startup() {
        let store = Arc::new(MockStore::new());
        let mut bridge = bridge(MockTransport::with_failure(), &store);

        assert!(bridge.start().await.is_ok());
        assert!(bridge.is_running());
        assert!(!bridge.transport().is_connected());
        bridge.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_closes() {
        let store = Arc::new(MockStore::new());
        let transport = MockTransport::new();
        let mut bridge = bridge(transport.clone(), &store);

        bridge.start().await.unwrap();
        assert!(transport.deliver("plant/counter-01/data", READING).await);
        bridge.shutdown().await.unwrap();

        assert_eq!(store.records().len(), 1);
        assert_eq!(transport.shutdown_calls(), 1);
        assert_eq!(
            transport.connection_state(),
            Some(ConnectionState::Closed)
        );
        assert!(!bridge.is_running());
    }
}
