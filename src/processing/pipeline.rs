//! Serialized production pipeline
//!
//! One task consumes queued readings in arrival order: compute the rate,
//! build the record, insert it. The rate state is owned here and nowhere else.

use super::rate::RateCalculator;
use super::record::build_record;
use crate::error::sanitize_error_message;
use crate::observability::metrics;
use crate::protocol::Reading;
use crate::store::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Result of handling one reading
#[derive(Debug)]
pub struct PipelineOutcome {
    pub rate: Option<f64>,
    pub stored: Result<(), StoreError>,
}

pub struct ProductionPipeline {
    calculator: RateCalculator,
    store: Arc<dyn Store>,
    device_id: String,
    insert_timeout: Duration,
}

impl ProductionPipeline {
    pub fn new(store: Arc<dyn Store>, device_id: impl Into<String>, insert_timeout: Duration) -> Self {
        Self {
            calculator: RateCalculator::new(),
            store,
            device_id: device_id.into(),
            insert_timeout,
        }
    }

    pub fn calculator(&self) -> &RateCalculator {
        &self.calculator
    }

    /// Handle one reading to completion
    ///
    /// The rate state advances before the insert, so a failed or slow store
    /// never holds back the next computation.
    pub async fn handle(&mut self, reading: Reading) -> PipelineOutcome {
        let rate = self
            .calculator
            .observe(reading.counter1, reading.device_timestamp);
        metrics().reading_processed(rate);

        let record = build_record(&reading, rate, &self.device_id);
        debug!(
            device_timestamp = %record.timestamp,
            bag_count = record.bag_count,
            bags_per_minute = ?record.bags_per_minute,
            machine_status = record.machine_status.as_str(),
            "Built production record"
        );

        let stored = match tokio::time::timeout(self.insert_timeout, self.store.insert(record))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.insert_timeout)),
        };

        match &stored {
            Ok(()) => {
                metrics().record_stored();
                info!(
                    bag_count = reading.counter1,
                    bags_per_minute = ?rate,
                    "Stored production record"
                );
            }
            Err(StoreError::Timeout(after)) => {
                metrics().store_timed_out();
                error!(timeout = ?after, "Store insert timed out, record dropped");
            }
            Err(e) => {
                metrics().store_failed();
                error!(
                    error = %sanitize_error_message(&e.to_string()),
                    "Store insert failed, record dropped"
                );
            }
        }

        PipelineOutcome { rate, stored }
    }

    /// Consume readings until every sender is gone and the queue is empty
    pub async fn run(mut self, mut readings: mpsc::Receiver<Reading>) {
        info!(device_id = %self.device_id, "Production pipeline started");
        let mut handled = 0u64;

        while let Some(reading) = readings.recv().await {
            self.handle(reading).await;
            handled += 1;
        }

        info!(handled, "Production pipeline drained");
    }
}
