//! Topic normalization and suffix classification
//!
//! Inbound topics are classified by suffix only. The subscription set is a
//! fixed, known-good pair of topics, so anything else is dropped.

/// Kind of message a topic carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Counter readings feeding the rate pipeline
    ProductionData,
    /// Device status announcements
    DeviceStatus,
    /// No marker matched
    Unrecognized,
}

/// Suffix markers used to classify inbound topics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMarkers {
    pub data_suffix: String,
    pub status_suffix: String,
}

impl Default for TopicMarkers {
    fn default() -> Self {
        Self {
            data_suffix: "/data".to_string(),
            status_suffix: "/status".to_string(),
        }
    }
}

impl TopicMarkers {
    pub fn new(data_suffix: impl Into<String>, status_suffix: impl Into<String>) -> Self {
        Self {
            data_suffix: data_suffix.into(),
            status_suffix: status_suffix.into(),
        }
    }

    /// Classify a topic by its suffix. Status wins when both markers match.
    pub fn classify(&self, topic: &str) -> TopicKind {
        let topic = normalize_topic(topic);
        if !self.status_suffix.is_empty() && topic.ends_with(&self.status_suffix) {
            TopicKind::DeviceStatus
        } else if !self.data_suffix.is_empty() && topic.ends_with(&self.data_suffix) {
            TopicKind::ProductionData
        } else {
            TopicKind::Unrecognized
        }
    }
}

/// Collapse repeated slashes and drop a trailing slash.
///
/// A leading slash is significant in MQTT, so it is kept as-is.
pub fn normalize_topic(topic: &str) -> String {
    let mut result = topic.to_string();

    while result.contains("//") {
        result = result.replace("//", "/");
    }

    if result.len() > 1 && result.ends_with('/') {
        result.pop();
    }

    result
}
