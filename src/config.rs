//! Bridge configuration
//!
//! Loaded from a TOML file or from the process environment. Secrets are never
//! stored in the file: it names the environment variables that hold them and
//! those are resolved when the bridge starts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub bridge: BridgeSection,
    pub mqtt: MqttSection,
    pub store: StoreSection,
    pub health: Option<HealthSection>,
}

/// Identity of this bridge instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// Device identifier written into every record (must match [a-zA-Z0-9._-]+)
    pub device_id: String,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL, `mqtt://host:port` or `mqtts://host:port`
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Production-data topic
    pub data_topic: String,
    /// Device status topic
    pub status_topic: String,
    #[serde(default = "default_data_suffix")]
    pub data_suffix: String,
    #[serde(default = "default_status_suffix")]
    pub status_suffix: String,
    /// Fixed delay before reconnecting after a transport drop
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Depth of the serialized production-data queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Store gateway section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    /// Base URL of the row API
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Environment variable containing the service key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_insert_timeout_ms")]
    pub insert_timeout_ms: u64,
}

/// Health server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    pub port: u16,
}

fn default_data_suffix() -> String {
    "/data".to_string()
}

fn default_status_suffix() -> String {
    "/status".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    64
}

fn default_table() -> String {
    "production_data".to_string()
}

fn default_api_key_env() -> String {
    "SUPABASE_SERVICE_KEY".to_string()
}

fn default_insert_timeout_ms() -> u64 {
    10_000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MqttSection {
    /// Username from the environment variable named by `username_env`
    pub fn username(&self) -> Option<String> {
        env_var_optional(self.username_env.as_deref())
    }

    /// Password from the environment variable named by `password_env`
    pub fn password(&self) -> Option<String> {
        env_var_optional(self.password_env.as_deref())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// The fixed subscription set: data topic first, then status topic
    pub fn subscription_topics(&self) -> Vec<String> {
        vec![self.data_topic.clone(), self.status_topic.clone()]
    }
}

impl StoreSection {
    pub fn insert_timeout(&self) -> Duration {
        Duration::from_millis(self.insert_timeout_ms)
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment
    ///
    /// Recognized: `MQTT_BROKER`, `MQTT_PORT`, `MQTT_PROTOCOL`, `MQTT_DATA_TOPIC`,
    /// `MQTT_STATUS_TOPIC`, `MQTT_RECONNECT_DELAY_MS`, `DEVICE_ID`,
    /// `SUPABASE_URL`, `SUPABASE_TABLE`, `HEALTH_PORT`. Credentials stay in
    /// `MQTT_USERNAME` / `MQTT_PASSWORD` / `SUPABASE_SERVICE_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration through a variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| ConfigError::EnvVarNotFound(key.to_string()))
        };
        let parsed = |key: &str| -> Result<Option<u64>, ConfigError> {
            lookup(key)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|_| {
                        ConfigError::InvalidConfig(format!("{key} must be an integer, got '{raw}'"))
                    })
                })
                .transpose()
        };

        let host = required("MQTT_BROKER")?;
        let scheme = lookup("MQTT_PROTOCOL").unwrap_or_else(|| "mqtt".to_string());
        let broker_url = match parsed("MQTT_PORT")? {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        };

        let health = parsed("HEALTH_PORT")?
            .map(|port| {
                u16::try_from(port)
                    .map(|port| HealthSection { port })
                    .map_err(|_| {
                        ConfigError::InvalidConfig(format!("HEALTH_PORT out of range: {port}"))
                    })
            })
            .transpose()?;

        let config = BridgeConfig {
            bridge: BridgeSection {
                device_id: required("DEVICE_ID")?,
            },
            mqtt: MqttSection {
                broker_url,
                username_env: Some("MQTT_USERNAME".to_string()),
                password_env: Some("MQTT_PASSWORD".to_string()),
                data_topic: required("MQTT_DATA_TOPIC")?,
                status_topic: required("MQTT_STATUS_TOPIC")?,
                data_suffix: default_data_suffix(),
                status_suffix: default_status_suffix(),
                reconnect_delay_ms: parsed("MQTT_RECONNECT_DELAY_MS")?
                    .unwrap_or_else(default_reconnect_delay_ms),
                keep_alive_secs: default_keep_alive_secs(),
                queue_capacity: default_queue_capacity(),
            },
            store: StoreSection {
                url: required("SUPABASE_URL")?,
                table: lookup("SUPABASE_TABLE").unwrap_or_else(default_table),
                api_key_env: default_api_key_env(),
                insert_timeout_ms: default_insert_timeout_ms(),
            },
            health,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.bridge.device_id)?;

        let url = Url::parse(&self.mqtt.broker_url).map_err(|_| {
            ConfigError::InvalidConfig(format!("invalid broker URL '{}'", self.mqtt.broker_url))
        })?;
        if !matches!(url.scheme(), "mqtt" | "mqtts" | "tcp" | "ssl") {
            return Err(ConfigError::InvalidConfig(format!(
                "unsupported broker scheme '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "broker URL '{}' has no host",
                self.mqtt.broker_url
            )));
        }

        let mqtt = &self.mqtt;
        if mqtt.data_suffix.is_empty() || mqtt.status_suffix.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "topic suffixes must not be empty".to_string(),
            ));
        }
        if !mqtt.data_topic.ends_with(&mqtt.data_suffix) {
            return Err(ConfigError::InvalidConfig(format!(
                "data topic '{}' must end with '{}'",
                mqtt.data_topic, mqtt.data_suffix
            )));
        }
        if !mqtt.status_topic.ends_with(&mqtt.status_suffix) {
            return Err(ConfigError::InvalidConfig(format!(
                "status topic '{}' must end with '{}'",
                mqtt.status_topic, mqtt.status_suffix
            )));
        }
        if mqtt.reconnect_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }
        if mqtt.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.store.url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("store url is required".to_string()));
        }
        if self.store.insert_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "insert_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the store service key from its environment variable
    pub fn get_store_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.store.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.store.api_key_env.clone()))
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[bridge]
device_id = "counter-01"

[mqtt]
broker_url = "mqtt://localhost:1883"
data_topic = "plant/counter-01/data"
status_topic = "plant/counter-01/status"

[store]
url = "http://localhost:54321"
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

fn env_var_optional(env_var_name: Option<&str>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

/// Validate device ID format
fn validate_device_id(device_id: &str) -> Result<(), ConfigError> {
    let valid_chars = device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if device_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidDeviceId(format!(
            "Device ID '{device_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
