//! Observability for the counter bridge
//!
//! Structured logging, metrics collection, and optional health check
//! endpoints.

pub mod health;
pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use health::HealthServer;
pub use logging::{LogFormat, init_default_logging, init_logging};
pub use metrics::{MetricsCollector, MetricsSnapshot, metrics};

// Span macros for structured logging
pub use logging::{lifecycle_span, message_span, mqtt_span};
