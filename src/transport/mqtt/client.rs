//! Impure I/O operations for the MQTT client
//!
//! Owns the rumqttc client and event loop. A single supervisor task polls the
//! event loop, re-subscribes on every ConnAck, hands publishes to the message
//! sink inline and waits out the fixed delay between reconnect attempts.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageHandler, SubscriptionOutcome};
use crate::config::MqttSection;
use crate::observability::metrics;
use crate::transport::{MessageSink, Transport};
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// How long `connect` waits for the first ConnAck before handing back control
const CONNACK_TIMEOUT: Duration = Duration::from_secs(30);

/// How long shutdown waits for the broker to close the session
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT transport client for the device data and status topics
pub struct MqttClient {
    device_id: String,
    client: AsyncClient,
    /// Taken by the supervisor on connect (`EventLoop` is not `Sync`)
    event_loop: Mutex<Option<EventLoop>>,
    topics: Vec<String>,
    reconnect_config: ReconnectConfig,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    closing: Arc<AtomicBool>,
}

impl MqttClient {
    pub fn new(device_id: &str, config: &MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(device_id, config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        Ok(MqttClient {
            device_id: device_id.to_string(),
            client,
            event_loop: Mutex::new(Some(event_loop)),
            topics: config.subscription_topics(),
            reconnect_config: ReconnectConfig::fixed(config.reconnect_delay()),
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            closing: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect_config
    }

    /// Start the supervisor and wait for the first ConnAck
    ///
    /// A timeout is returned as an error but the supervisor keeps retrying in
    /// the background.
    pub async fn connect(&mut self, sink: Arc<dyn MessageSink>) -> Result<(), MqttError> {
        let event_loop = self
            .event_loop
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| {
                MqttError::ConnectionFailed("Event loop already started".to_string())
            })?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let supervisor = Supervisor {
            device_id: self.device_id.clone(),
            client: self.client.clone(),
            topics: self.topics.clone(),
            reconnect_config: self.reconnect_config.clone(),
            state_tx,
            closing: self.closing.clone(),
            sink,
            reconnect_attempts: 0,
        };
        self.event_loop_handle = Some(tokio::spawn(supervisor.run(event_loop, shutdown_rx)));

        Self::wait_for_connection_confirmation(state_rx, CONNACK_TIMEOUT).await
    }

    /// Wait until the state reaches Connected
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                match *state_rx.borrow_and_update() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Closed => {
                        return Err(MqttError::ConnectionFailed(
                            "Client closed before connecting".to_string(),
                        ));
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnAckTimeout(timeout)),
        }
    }

    /// Unsubscribe, disconnect and stop the supervisor
    pub async fn shutdown(&mut self) -> Result<(), MqttError> {
        self.closing.store(true, Ordering::SeqCst);
        let can_unsubscribe = self
            .connection_state()
            .is_some_and(|state| HealthMonitor::can_subscribe(&state));

        if can_unsubscribe {
            for topic in &self.topics {
                if let Err(e) = self.client.unsubscribe(topic.clone()).await {
                    warn!(topic = %topic, error = %e, "Failed to request unsubscribe");
                }
            }
            if let Err(e) = self.client.disconnect().await {
                warn!(error = %e, "Failed to request disconnect");
            }
        } else if let Some(shutdown_tx) = &self.shutdown_tx {
            // Nothing to flush; interrupt a pending reconnect delay
            let _ = shutdown_tx.send(true);
        }

        if let Some(mut handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, &mut handle).await {
                Ok(_) => info!("MQTT supervisor stopped"),
                Err(_) => {
                    if let Some(shutdown_tx) = &self.shutdown_tx {
                        let _ = shutdown_tx.send(true);
                    }
                    if tokio::time::timeout(Duration::from_secs(1), &mut handle)
                        .await
                        .is_err()
                    {
                        warn!("MQTT supervisor did not stop, aborting");
                        handle.abort();
                    }
                }
            }
        }

        if let Some(state_tx) = &self.state_tx {
            let current = state_tx.borrow().clone();
            let next =
                HealthMonitor::determine_next_state(&current, ConnectionEvent::ShutdownCompleted);
            HealthMonitor::log_state_transition(&current, &next);
            state_tx.send_replace(next);
        }
        metrics().mqtt_session_closed();

        info!(device_id = %self.device_id, "MQTT client shut down");
        Ok(())
    }

    /// Current connection state; None before `connect`
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }
}

/// State owned by the event loop task
struct Supervisor {
    device_id: String,
    client: AsyncClient,
    topics: Vec<String>,
    reconnect_config: ReconnectConfig,
    state_tx: watch::Sender<ConnectionState>,
    closing: Arc<AtomicBool>,
    sink: Arc<dyn MessageSink>,
    reconnect_attempts: u32,
}

impl Supervisor {
    async fn run(mut self, mut event_loop: EventLoop, mut shutdown_rx: watch::Receiver<bool>) {
        info!(device_id = %self.device_id, "Starting MQTT event loop supervisor");
        metrics().mqtt_connection_attempt();

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT supervisor");
                        break;
                    }
                }
                event_result = event_loop.poll() => {
                    let keep_running = match event_result {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            self.process_event_route(route).await
                        }
                        Err(e) => self.handle_event_loop_error(e, &shutdown_rx).await,
                    };
                    if !keep_running {
                        break;
                    }
                }
            }
        }

        info!(device_id = %self.device_id, "MQTT event loop stopped");
    }

    fn transition(&self, event: ConnectionEvent) {
        let current = self.state_tx.borrow().clone();
        let next = HealthMonitor::determine_next_state(&current, event);
        HealthMonitor::log_state_transition(&current, &next);
        self.state_tx.send_replace(next);
    }

    /// Returns false when the supervisor should stop
    async fn process_event_route(&mut self, route: EventRoute) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                self.transition(ConnectionEvent::ConnAckReceived);
                self.reconnect_attempts = 0;
                metrics().mqtt_connection_established();

                if !self.closing.load(Ordering::SeqCst) {
                    self.subscribe_topics().await;
                }
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                let span = crate::message_span!(topic = %topic, retain = retain);
                self.sink.dispatch(&topic, &payload).instrument(span).await;
                true
            }
            EventRoute::Disconnected => {
                if self.closing.load(Ordering::SeqCst) {
                    return false;
                }
                self.transition(ConnectionEvent::DisconnectedByBroker);
                metrics().mqtt_connection_lost();
                // The next poll surfaces the closed socket and takes the reconnect path
                true
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                outcomes,
            } => {
                self.report_subscriptions(packet_id, &outcomes);
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    /// Request one filter per topic; the broker grants each independently
    async fn subscribe_topics(&self) {
        let filters = MessageHandler::build_subscription_filters(&self.topics);
        let span = crate::mqtt_span!(operation = "subscribe", device_id = %self.device_id);
        match self.client.subscribe_many(filters).instrument(span).await {
            Ok(()) => debug!(topics = ?self.topics, "Subscription request sent"),
            Err(e) => {
                for topic in &self.topics {
                    error!(topic = %topic, error = %e, "Failed to request subscription");
                    metrics().subscription_failed();
                }
            }
        }
    }

    fn report_subscriptions(&self, packet_id: u16, outcomes: &[SubscriptionOutcome]) {
        for (topic, outcome) in MessageHandler::pair_subscription_outcomes(&self.topics, outcomes)
        {
            match outcome {
                SubscriptionOutcome::Granted => {
                    info!(topic = %topic, packet_id, "Subscribed");
                }
                SubscriptionOutcome::Rejected(reason) => {
                    error!(topic = %topic, packet_id, reason = %reason, "Subscription rejected");
                    metrics().subscription_failed();
                }
            }
        }
    }

    /// Returns false when the supervisor should stop
    async fn handle_event_loop_error(
        &mut self,
        error: rumqttc::v5::ConnectionError,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> bool {
        if self.closing.load(Ordering::SeqCst) {
            debug!("Event loop ended during shutdown: {}", error);
            return false;
        }

        self.transition(ConnectionEvent::NetworkError(error.to_string()));
        metrics().mqtt_connection_lost();

        let decision = HealthMonitor::should_attempt_reconnection(
            self.reconnect_attempts,
            &self.reconnect_config,
            *shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.reconnect_attempts = attempt;
                self.transition(ConnectionEvent::ReconnectionStarted(attempt));
                info!(attempt, delay_ms, "Waiting before reconnect");

                if !Self::interruptible_sleep(shutdown_rx.clone(), delay_ms).await {
                    return false;
                }
                if self.closing.load(Ordering::SeqCst) {
                    return false;
                }

                // rumqttc reconnects on the next poll
                metrics().mqtt_connection_attempt();
                true
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
        }
    }

    /// Returns true if the sleep completed, false if shutdown was requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnect delay");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self, sink: Arc<dyn MessageSink>) -> Result<(), Self::Error> {
        MqttClient::connect(self, sink).await
    }

    async fn shutdown(&mut self) -> Result<(), Self::Error> {
        MqttClient::shutdown(self).await
    }

    fn is_connected(&self) -> bool {
        MqttClient::is_connected(self)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }
}
