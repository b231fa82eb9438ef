//! Pure reconnection decisions and connection state transitions

use super::connection::{ConnectionState, ReconnectConfig};
use tracing::{debug, error, info, warn};

/// Reconnection decision logic and state transitions
pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide whether another reconnect attempt should run
    ///
    /// Only a shutdown request stops reconnecting; attempts are unlimited.
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        ReconnectionDecision::Proceed {
            attempt: current_attempts.saturating_add(1),
            delay_ms: config.delay_ms,
        }
    }

    /// Determine next state after a connection event
    pub fn determine_next_state(
        current_state: &ConnectionState,
        event: ConnectionEvent,
    ) -> ConnectionState {
        // Closed is terminal
        if *current_state == ConnectionState::Closed {
            return ConnectionState::Closed;
        }

        match event {
            ConnectionEvent::ConnAckReceived => ConnectionState::Connected,
            ConnectionEvent::DisconnectedByBroker => {
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(error) => ConnectionState::Disconnected(error),
            ConnectionEvent::ReconnectionStarted(attempt) => ConnectionState::Reconnecting(attempt),
            ConnectionEvent::ShutdownCompleted => ConnectionState::Closed,
        }
    }

    pub fn can_subscribe(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Reconnecting(attempt), ConnectionState::Connected) => {
                info!(attempt, "Broker session restored");
            }
            (_, ConnectionState::Connected) => info!("Broker session established"),
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!(reason = %reason, "Broker connection lost");
            }
            (ConnectionState::Reconnecting(attempt), ConnectionState::Disconnected(reason)) => {
                error!(attempt, reason = %reason, "Reconnect attempt failed");
            }
            (_, ConnectionState::Reconnecting(attempt)) => {
                info!(attempt, "Reconnect scheduled");
            }
            (_, ConnectionState::Closed) => info!("Broker connection closed"),
            _ => debug!(from = ?from, to = ?to, "Connection state changed"),
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay_ms: u64 },
    AbortShutdownRequested,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// ConnAck received from broker
    ConnAckReceived,
    /// Broker sent Disconnect
    DisconnectedByBroker,
    /// Network or protocol error from the event loop
    NetworkError(String),
    /// Fixed delay started before attempt N
    ReconnectionStarted(u32),
    /// Graceful shutdown finished
    ShutdownCompleted,
}
