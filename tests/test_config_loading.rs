//! Configuration loading and validation tests
//!
//! Observable outcomes of loading files: defaults applied, invalid setups
//! rejected with the right error kind.

use counter_bridge::config::{BridgeConfig, ConfigError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[bridge]
device_id = "counter-01"

[mqtt]
broker_url = "mqtts://broker.example.com:8883"
username_env = "MQTT_USER"
password_env = "MQTT_PASS"
data_topic = "factory/line-a/counter-01/data"
status_topic = "factory/line-a/counter-01/status"
reconnect_delay_ms = 2500

[store]
url = "https://project.example.co"
table = "line_a_production"
api_key_env = "LINE_A_KEY"
insert_timeout_ms = 3000

[health]
port = 9090
"#,
    );

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.bridge.device_id, "counter-01");
    assert_eq!(config.mqtt.broker_url, "mqtts://broker.example.com:8883");
    assert_eq!(config.mqtt.username_env.as_deref(), Some("MQTT_USER"));
    assert_eq!(config.mqtt.reconnect_delay().as_millis(), 2500);
    assert_eq!(
        config.mqtt.subscription_topics(),
        vec![
            "factory/line-a/counter-01/data".to_string(),
            "factory/line-a/counter-01/status".to_string()
        ]
    );
    assert_eq!(config.store.table, "line_a_production");
    assert_eq!(config.store.insert_timeout().as_millis(), 3000);
    assert_eq!(config.health.map(|h| h.port), Some(9090));
}

#[test]
fn test_config_applies_defaults() {
    let temp_file = write_config(
        r#"
[bridge]
device_id = "counter-01"

[mqtt]
broker_url = "mqtt://localhost"
data_topic = "plant/counter-01/data"
status_topic = "plant/counter-01/status"

[store]
url = "http://localhost:54321"
"#,
    );

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.mqtt.reconnect_delay_ms, 5000);
    assert_eq!(config.mqtt.keep_alive_secs, 60);
    assert_eq!(config.mqtt.queue_capacity, 64);
    assert_eq!(config.mqtt.data_suffix, "/data");
    assert_eq!(config.mqtt.status_suffix, "/status");
    assert_eq!(config.store.table, "production_data");
    assert_eq!(config.store.api_key_env, "SUPABASE_SERVICE_KEY");
    assert_eq!(config.store.insert_timeout_ms, 10_000);
    assert!(config.health.is_none());
}

#[test]
fn test_custom_suffixes_must_match_topics() {
    let temp_file = write_config(
        r#"
[bridge]
device_id = "counter-01"

[mqtt]
broker_url = "mqtt://localhost"
data_topic = "plant/counter-01/telemetry"
status_topic = "plant/counter-01/heartbeat"
data_suffix = "/telemetry"
status_suffix = "/heartbeat"

[store]
url = "http://localhost:54321"
"#,
    );

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(config.mqtt.data_suffix, "/telemetry");
}

#[test]
fn test_missing_file_is_file_read_error() {
    let result = BridgeConfig::load_from_file(std::path::Path::new(
        "/nonexistent/counter-bridge/bridge.toml",
    ));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let temp_file = write_config("[bridge\ndevice_id = ");
    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_required_section_is_parse_error() {
    let temp_file = write_config(
        r#"
[bridge]
device_id = "counter-01"

[mqtt]
broker_url = "mqtt://localhost"
data_topic = "plant/counter-01/data"
status_topic = "plant/counter-01/status"
"#,
    );

    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_device_id_is_rejected() {
    let temp_file = write_config(
        r#"
[bridge]
device_id = "counter 01/../x"

[mqtt]
broker_url = "mqtt://localhost"
data_topic = "plant/counter-01/data"
status_topic = "plant/counter-01/status"

[store]
url = "http://localhost:54321"
"#,
    );

    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidDeviceId(_))));
}

#[test]
fn test_swapped_topics_are_rejected() {
    let temp_file = write_config(
        r#"
[bridge]
device_id = "counter-01"

[mqtt]
broker_url = "mqtt://localhost"
data_topic = "plant/counter-01/status"
status_topic = "plant/counter-01/data"

[store]
url = "http://localhost:54321"
"#,
    );

    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_zero_reconnect_delay_is_rejected() {
    let temp_file = write_config(
        r#"
[bridge]
device_id = "counter-01"

[mqtt]
broker_url = "mqtt://localhost"
data_topic = "plant/counter-01/data"
status_topic = "plant/counter-01/status"
reconnect_delay_ms = 0

[store]
url = "http://localhost:54321"
"#,
    );

    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}
