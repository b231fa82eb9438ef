//! Counter Bridge
//!
//! Ingests telemetry from an industrial counting device over MQTT, derives a
//! bags-per-minute rate from counter deltas and writes one production record
//! per reading to a REST store.
//!
//! # Overview
//!
//! - [`transport`] - broker connection, subscriptions, fixed-delay reconnect
//! - [`processing`] - topic routing, rate calculation, record building and
//!   the serialized pipeline that ties them to the store
//! - [`store`] - the insert contract and its REST implementation
//! - [`bridge`] - lifecycle wiring and graceful shutdown
//!
//! # Quick Start
//!
//! ```rust
//! use counter_bridge::processing::{build_record, RateCalculator};
//! use counter_bridge::protocol::Reading;
//!
//! let mut calculator = RateCalculator::new();
//!
//! let first = Reading::parse(
//!     br#"{"t":"2024-01-01T00:00:00Z","di1":100,"di2":1,"di3":0,"di4":0}"#,
//! ).unwrap();
//! let second = Reading::parse(
//!     br#"{"t":"2024-01-01T00:01:00Z","di1":160,"di2":1,"di3":0,"di4":0}"#,
//! ).unwrap();
//!
//! assert_eq!(calculator.observe(first.counter1, first.device_timestamp), None);
//! let rate = calculator.observe(second.counter1, second.device_timestamp);
//! assert_eq!(rate, Some(60.0));
//!
//! let record = build_record(&second, rate, "counter-01");
//! assert_eq!(record.bag_count, 160);
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod processing;
pub mod protocol;
pub mod store;
pub mod testing;
pub mod transport;

pub use bridge::{BridgeLifecycle, LifecycleError};
pub use config::*;
pub use error::{BridgeError, BridgeResult};
pub use processing::{ProductionPipeline, RateCalculator, TopicRouter};
pub use protocol::*;
pub use store::{RestStore, Store, StoreError};
pub use transport::mqtt::MqttClient;
