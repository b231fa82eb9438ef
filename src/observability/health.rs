//! Health check HTTP server
//!
//! Optional endpoints for process supervisors. Status is derived from the
//! global metrics collector, so the server holds no bridge state of its own.

use crate::observability::metrics::{current_timestamp, metrics, MetricsCollector};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::Filter;

/// Readings older than this mark the pipeline as stale
const READING_STALENESS_THRESHOLD_SECONDS: u64 = 300;

/// HTTP health check server
pub struct HealthServer {
    device_id: String,
    port: u16,
}

impl HealthServer {
    pub fn new(device_id: String, port: u16) -> Self {
        Self { device_id, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until the process exits
    pub async fn start(self) {
        let device_id = self.device_id.clone();

        // GET /health - overall status with per-component checks
        let health_route = warp::path("health").and(warp::get()).and_then(move || {
            let device_id = device_id.clone();
            async move {
                let status = health_status(&device_id, metrics(), current_timestamp());
                let code = if status.status == "healthy" {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&status), code))
            }
        });

        // GET /metrics - full metrics snapshot
        let metrics_route = warp::path("metrics").and(warp::get()).and_then(|| async {
            Ok::<_, Infallible>(warp::reply::json(&metrics().get_metrics()))
        });

        // GET /ready - MQTT session established
        let ready_route = warp::path("ready").and(warp::get()).and_then(|| async {
            let ready = metrics().is_mqtt_connected();
            let response = ReadinessResponse {
                ready,
                timestamp: current_timestamp(),
            };
            let code = if ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&response), code))
        });

        // GET /live - process is up
        let live_route = warp::path("live").and(warp::get()).and_then(|| async {
            let response = LivenessResponse {
                alive: true,
                timestamp: current_timestamp(),
            };
            Ok::<_, Infallible>(warp::reply::json(&response))
        });

        let routes = health_route.or(metrics_route).or(ready_route).or(live_route);

        tracing::info!("Starting health server on port {}", self.port);
        warp::serve(routes).run(([0, 0, 0, 0], self.port)).await;
    }
}

fn health_status(device_id: &str, collector: &MetricsCollector, now: u64) -> HealthStatus {
    let snapshot = collector.get_metrics();
    let mut checks = HashMap::new();

    checks.insert(
        "mqtt".to_string(),
        if snapshot.mqtt.connected {
            HealthCheck::healthy("MQTT session established", now)
        } else {
            HealthCheck::unhealthy("MQTT disconnected", now)
        },
    );

    let last_reading = snapshot.messages.last_reading_at;
    let pipeline = if last_reading == 0 {
        HealthCheck::healthy("No readings processed yet", now)
    } else if now.saturating_sub(last_reading) > READING_STALENESS_THRESHOLD_SECONDS {
        HealthCheck {
            status: "stale".to_string(),
            message: Some(format!(
                "No readings for {} seconds",
                now.saturating_sub(last_reading)
            )),
            last_check: now,
        }
    } else {
        HealthCheck::healthy("Recent readings", now)
    };
    checks.insert("pipeline".to_string(), pipeline);

    // Staleness is reported but does not degrade overall health: the device
    // may simply be idle.
    let healthy = checks
        .values()
        .all(|check| check.status == "healthy" || check.status == "stale");

    HealthStatus {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: now,
        device_id: device_id.to_string(),
        uptime_seconds: now.saturating_sub(snapshot.lifecycle.started_at),
        checks,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

impl HealthCheck {
    fn healthy(message: &str, now: u64) -> Self {
        Self {
            status: "healthy".to_string(),
            message: Some(message.to_string()),
            last_check: now,
        }
    }

    fn unhealthy(message: &str, now: u64) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.to_string()),
            last_check: now,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    device_id: String,
    uptime_seconds: u64,
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_server_creation() {
        let server = HealthServer::new("counter-01".to_string(), 8080);
        assert_eq!(server.device_id, "counter-01");
        assert_eq!(server.port(), 8080);
    }

    #[test]
    fn test_degraded_without_mqtt() {
        let collector = MetricsCollector::new();
        let status = health_status("counter-01", &collector, current_timestamp());

        assert_eq!(status.status, "degraded");
        assert_eq!(status.checks["mqtt"].status, "unhealthy");
        assert_eq!(status.checks["pipeline"].status, "healthy");
    }

    #[test]
    fn test_healthy_when_connected() {
        let collector = MetricsCollector::new();
        collector.mqtt_connection_established();
        collector.reading_processed(Some(12.5));

        let status = health_status("counter-01", &collector, current_timestamp());
        assert_eq!(status.status, "healthy");
        assert_eq!(status.device_id, "counter-01");
    }

    #[test]
    fn test_degraded_after_session_closed() {
        let collector = MetricsCollector::new();
        collector.mqtt_connection_established();
        collector.mqtt_session_closed();

        let status = health_status("counter-01", &collector, current_timestamp());
        assert_eq!(status.status, "degraded");
        assert_eq!(status.checks["mqtt"].status, "unhealthy");
    }

    #[test]
    fn test_stale_pipeline_is_reported() {
        let collector = MetricsCollector::new();
        collector.mqtt_connection_established();
        collector.reading_processed(None);

        let later = current_timestamp() + READING_STALENESS_THRESHOLD_SECONDS + 60;
        let status = health_status("counter-01", &collector, later);

        assert_eq!(status.checks["pipeline"].status, "stale");
        assert_eq!(status.status, "healthy");
    }
}
