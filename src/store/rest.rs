//! REST store gateway for PostgREST-compatible row APIs
//!
//! Inserts one row per request into `{base_url}/rest/v1/{table}`, the layout
//! used by hosted Postgres services that expose tables over HTTP and push
//! change notifications to dashboards.

use super::{Store, StoreError};
use crate::protocol::ProductionRecord;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// REST store configuration
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    pub base_url: String,
    pub table: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for RestStoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            table: "production_data".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Store implementation backed by an HTTP row-insert API
pub struct RestStore {
    config: RestStoreConfig,
    client: Client,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        if config.base_url.is_empty() {
            return Err(StoreError::NotConfigured(
                "store base URL is required".to_string(),
            ));
        }
        if config.api_key.is_empty() {
            return Err(StoreError::NotConfigured(
                "store API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Endpoint rows are posted to
    pub fn insert_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.table
        )
    }
}

#[async_trait]
impl Store for RestStore {
    async fn insert(&self, record: ProductionRecord) -> Result<(), StoreError> {
        let body = serde_json::to_vec(&record).map_err(StoreError::Serialization)?;

        let response = self
            .client
            .post(self.insert_url())
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout(self.config.timeout)
                } else {
                    StoreError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(table = %self.config.table, status = %status, "Inserted production record");
        Ok(())
    }
}
