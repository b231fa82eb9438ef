//! Error taxonomy for the counter bridge
//!
//! Every kind is handled where it occurs: logged, the offending message or
//! record dropped, and the bridge keeps running. Only configuration errors
//! abort startup.

use crate::config::ConfigError;
use crate::protocol::PayloadError;
use crate::store::StoreError;
use crate::transport::mqtt::MqttError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Raw payload bytes kept in a malformed-payload diagnostic
const MAX_RAW_PREVIEW: usize = 1024;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String, raw: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Shutdown requested")]
    ShutdownRequested,
}

impl BridgeError {
    /// Build a malformed-payload error, keeping a lossy preview of the bytes
    pub fn malformed(error: PayloadError, raw: &[u8]) -> Self {
        let preview = if raw.len() > MAX_RAW_PREVIEW {
            format!(
                "{}...[truncated]",
                String::from_utf8_lossy(&raw[..MAX_RAW_PREVIEW])
            )
        } else {
            String::from_utf8_lossy(raw).into_owned()
        };

        Self::MalformedPayload {
            reason: error.to_string(),
            raw: preview,
        }
    }
}

/// Strip credentials and sensitive paths from text headed for the logs
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
