//! Store gateway: the bridge's only I/O sink
//!
//! The core depends on a single insert operation. Delivery is at-most-once:
//! a failed insert is logged by the caller and the record is dropped.

use crate::protocol::ProductionRecord;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod rest;

pub use rest::{RestStore, RestStoreConfig};

/// Failures surfaced by a store insert
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Network(String),
    #[error("store rejected insert with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("store insert timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to serialize record: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("store not configured: {0}")]
    NotConfigured(String),
}

/// Persistence contract for production records
///
/// Ownership of the record moves into the store; the bridge keeps no copy.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert(&self, record: ProductionRecord) -> Result<(), StoreError>;
}

