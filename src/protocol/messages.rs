//! Message types for device telemetry
//!
//! Production-data payloads arrive as `{t, di1, di2, di3, di4}` and status
//! payloads as `{status, name, macid, ipaddr}`. Both are UTF-8 JSON objects.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reasons a device payload could not be turned into a typed message
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload does not match schema: {0}")]
    Schema(#[source] serde_json::Error),
    #[error("unparsable device timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Production-data payload exactly as the device publishes it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPayload {
    /// Device clock, ISO-8601
    pub t: String,
    pub di1: u64,
    pub di2: u64,
    pub di3: u64,
    pub di4: u64,
}

/// One parsed production-data message
///
/// Lives for a single handling cycle: it feeds the rate calculator and the
/// record builder, then is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub device_timestamp: DateTime<Utc>,
    pub counter1: u64,
    pub counter2: u64,
    pub counter3: u64,
    pub counter4: u64,
    /// The original JSON object, kept verbatim for audit
    pub raw_payload: Value,
}

impl Reading {
    /// Parse a production-data payload.
    ///
    /// Fails on non-JSON input, non-object JSON, missing or mistyped fields
    /// (negative counters included) and timestamps that are not ISO-8601.
    ///
    /// # Examples
    /// ```
    /// use counter_bridge::protocol::Reading;
    ///
    /// let reading = Reading::parse(
    ///     br#"{"t":"2024-01-01T00:00:00Z","di1":100,"di2":1,"di3":0,"di4":0}"#,
    /// ).unwrap();
    /// assert_eq!(reading.counter1, 100);
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        let raw = parse_object(payload)?;
        let data: DataPayload =
            serde_json::from_value(raw.clone()).map_err(PayloadError::Schema)?;
        let device_timestamp = parse_device_timestamp(&data.t)
            .ok_or_else(|| PayloadError::InvalidTimestamp(data.t.clone()))?;

        Ok(Self {
            device_timestamp,
            counter1: data.di1,
            counter2: data.di2,
            counter3: data.di3,
            counter4: data.di4,
            raw_payload: raw,
        })
    }
}

/// Device status announcement; logged, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceStatusEvent {
    pub status: String,
    pub name: String,
    #[serde(rename = "macid")]
    pub mac_address: String,
    #[serde(rename = "ipaddr")]
    pub ip_address: String,
}

impl DeviceStatusEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        let raw = parse_object(payload)?;
        serde_json::from_value(raw).map_err(PayloadError::Schema)
    }
}

/// Machine state derived from the second input channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Running,
    Stopped,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Running => "running",
            MachineStatus::Stopped => "stopped",
        }
    }
}

/// Normalized row handed to the store gateway
///
/// Field names are the store's column names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionRecord {
    pub device_id: String,
    pub bag_count: u64,
    /// `None` serializes as `null`: no prior reading to compare against
    pub bags_per_minute: Option<f64>,
    pub line_1_bags: u64,
    pub line_2_bags: u8,
    pub line_3_bags: u8,
    pub line_4_bags: u8,
    pub machine_status: MachineStatus,
    /// Device clock, not ingestion time
    pub timestamp: DateTime<Utc>,
    pub raw_data: Value,
}

fn parse_object(payload: &[u8]) -> Result<Value, PayloadError> {
    let value: Value = serde_json::from_slice(payload).map_err(PayloadError::InvalidJson)?;
    if !value.is_object() {
        return Err(PayloadError::NotAnObject);
    }
    Ok(value)
}

/// Parse the device clock. RFC 3339 first; offset-less timestamps are taken as UTC.
pub fn parse_device_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    #[test]
    fn test_parse_reading() {
        let payload = br#"{"t":"2024-01-01T00:01:00Z","di1":160,"di2":1,"di3":0,"di4":3}"#;
        let reading = Reading::parse(payload).unwrap();

        assert_eq!(reading.counter1, 160);
        assert_eq!(reading.counter2, 1);
        assert_eq!(reading.counter3, 0);
        assert_eq!(reading.counter4, 3);
        assert_eq!(reading.device_timestamp.minute(), 1);
        assert_eq!(reading.raw_payload["di1"], json!(160));
    }

    #[test]
    fn test_parse_reading_keeps_extra_fields_in_raw_payload() {
        let payload = br#"{"t":"2024-01-01T00:00:00Z","di1":1,"di2":0,"di3":0,"di4":0,"fw":"1.2"}"#;
        let reading = Reading::parse(payload).unwrap();
        assert_eq!(reading.raw_payload["fw"], json!("1.2"));
    }

    #[test]
    fn test_parse_reading_rejects_invalid_json() {
        let result = Reading::parse(b"not json");
        assert!(matches!(result, Err(PayloadError::InvalidJson(_))));
    }

    #[test]
    fn test_parse_reading_rejects_non_object() {
        let result = Reading::parse(b"[1,2,3]");
        assert!(matches!(result, Err(PayloadError::NotAnObject)));
    }

    #[test]
    fn test_parse_reading_rejects_missing_field() {
        let payload = br#"{"t":"2024-01-01T00:00:00Z","di1":1,"di2":0,"di3":0}"#;
        let result = Reading::parse(payload);
        assert!(matches!(result, Err(PayloadError::Schema(_))));
    }

    #[test]
    fn test_parse_reading_rejects_negative_counter() {
        let payload = br#"{"t":"2024-01-01T00:00:00Z","di1":-5,"di2":0,"di3":0,"di4":0}"#;
        assert!(matches!(
            Reading::parse(payload),
            Err(PayloadError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_reading_rejects_bad_timestamp() {
        let payload = br#"{"t":"yesterday","di1":1,"di2":0,"di3":0,"di4":0}"#;
        assert!(matches!(
            Reading::parse(payload),
            Err(PayloadError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_device_timestamp_formats() {
        let utc = parse_device_timestamp("2024-01-01T00:00:00Z").unwrap();
        let offset = parse_device_timestamp("2024-01-01T02:00:00+02:00").unwrap();
        let naive = parse_device_timestamp("2024-01-01T00:00:00").unwrap();
        let spaced = parse_device_timestamp("2024-01-01 00:00:00.000").unwrap();

        assert_eq!(utc, offset);
        assert_eq!(utc, naive);
        assert_eq!(utc, spaced);
        assert!(parse_device_timestamp("").is_none());
    }

    #[test]
    fn test_parse_status_event() {
        let payload = br#"{"status":"online","name":"counter-01","macid":"AA:BB:CC:DD:EE:FF","ipaddr":"10.0.0.7"}"#;
        let event = DeviceStatusEvent::parse(payload).unwrap();

        assert_eq!(event.status, "online");
        assert_eq!(event.name, "counter-01");
        assert_eq!(event.mac_address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(event.ip_address, "10.0.0.7");
    }

    #[test]
    fn test_parse_status_event_missing_field() {
        let payload = br#"{"status":"online"}"#;
        assert!(DeviceStatusEvent::parse(payload).is_err());
    }

    #[test]
    fn test_record_wire_format() {
        let record = ProductionRecord {
            device_id: "line-a".to_string(),
            bag_count: 100,
            bags_per_minute: None,
            line_1_bags: 100,
            line_2_bags: 1,
            line_3_bags: 0,
            line_4_bags: 0,
            machine_status: MachineStatus::Running,
            timestamp: parse_device_timestamp("2024-01-01T00:00:00Z").unwrap(),
            raw_data: json!({"di1": 100}),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["device_id"], json!("line-a"));
        assert_eq!(value["bags_per_minute"], Value::Null);
        assert_eq!(value["machine_status"], json!("running"));
        assert_eq!(value["raw_data"]["di1"], json!(100));
        assert!(value["timestamp"].as_str().unwrap().starts_with("2024-01-01T00:00:00"));
    }
}
