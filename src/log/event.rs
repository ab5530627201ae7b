//! The structured record every transport receives.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::level::Level;

/// Keys owned by the record itself. Metadata cannot overwrite them.
const RESERVED: [&str; 3] = ["level", "message", "timestamp"];

/// One structured log record.
///
/// `fields` holds everything that is not level, message or timestamp: the
/// process-wide default tags, fields bound by a child logger and per-call
/// metadata, merged in that order of increasing precedence.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: Map<String, Value>,
}

impl LogEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: Map::new(),
        }
    }

    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// ISO-8601 UTC timestamp with millisecond precision.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Flattened JSON object: `level`, `message`, every field, `timestamp`.
    pub fn to_json(&self) -> Value {
        let mut out = Map::with_capacity(self.fields.len() + RESERVED.len());
        out.insert("level".into(), Value::String(self.level.as_str().into()));
        out.insert("message".into(), Value::String(self.message.clone()));
        for (key, value) in &self.fields {
            if !RESERVED.contains(&key.as_str()) {
                out.insert(key.clone(), value.clone());
            }
        }
        out.insert("timestamp".into(), Value::String(self.timestamp_iso()));
        Value::Object(out)
    }

    /// Single-line JSON, no trailing newline.
    pub fn to_json_line(&self) -> String {
        self.to_json().to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_is_flat_and_single_line() {
        let mut fields = Map::new();
        fields.insert("requestId".into(), json!("abc"));
        fields.insert("nested".into(), json!({ "a": [1, 2] }));
        let event = LogEvent::new(Level::Info, "hello\nworld").with_fields(fields);

        let line = event.to_json_line();
        assert!(!line.contains('\n'));

        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["message"], "hello\nworld");
        assert_eq!(parsed["requestId"], "abc");
        assert_eq!(parsed["nested"]["a"][1], 2);
        assert!(parsed["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn metadata_cannot_overwrite_reserved_keys() {
        let mut fields = Map::new();
        fields.insert("level".into(), json!("error"));
        fields.insert("message".into(), json!("spoofed"));
        let event = LogEvent::new(Level::Debug, "real").with_fields(fields);

        let parsed = event.to_json();
        assert_eq!(parsed["level"], "debug");
        assert_eq!(parsed["message"], "real");
    }
}
