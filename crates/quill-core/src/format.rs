//! JSON line formatting for persisted records.
//!
//! One record becomes one JSON object. Field order is fixed:
//! `timestamp`, `channel`, `level`, `thread_id`, `message`, then the
//! optional `session_id` and `build_version`, then custom fields.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::LogRecord;

/// Timestamp layout: local time, microseconds, no offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

static SESSION_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Identifier shared by every line written by this process.
pub fn session_id() -> &'static str {
    &SESSION_ID
}

/// Keys every line writes itself; custom fields may not reuse them.
pub const RESERVED_FIELDS: &[&str] = &[
    "timestamp",
    "channel",
    "level",
    "thread_id",
    "message",
    "session_id",
    "build_version",
];

/// Options controlling the JSON line shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonConfig {
    /// Add the process session id.
    pub include_session_id: bool,
    /// Add `build_version`.
    pub include_build_version: bool,
    /// Minified single line when true, 2-space pretty output otherwise.
    pub compact: bool,
    /// Value written as `build_version`.
    pub build_version: String,
    /// Extra string fields appended to every line.
    pub custom_fields: BTreeMap<String, String>,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            include_session_id: true,
            include_build_version: true,
            compact: true,
            build_version: env!("CARGO_PKG_VERSION").to_string(),
            custom_fields: BTreeMap::new(),
        }
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: String,
    channel: &'a str,
    level: &'static str,
    thread_id: String,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_version: Option<&'a str>,
    #[serde(flatten)]
    custom: &'a BTreeMap<String, String>,
}

/// Formats records as JSON lines.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    config: JsonConfig,
}

impl JsonFormatter {
    /// Creates a formatter.
    #[must_use]
    pub const fn new(config: JsonConfig) -> Self {
        Self { config }
    }

    /// The active options.
    #[must_use]
    pub const fn config(&self) -> &JsonConfig {
        &self.config
    }

    /// Formats one record. The result carries no trailing newline.
    pub fn format(&self, record: &LogRecord) -> Result<String> {
        let line = JsonLine {
            timestamp: record.timestamp().format(TIMESTAMP_FORMAT).to_string(),
            channel: record.channel(),
            level: record.severity().as_str(),
            thread_id: format!("{:08X}", record.thread_id()),
            message: record.message(),
            session_id: self.config.include_session_id.then(session_id),
            build_version: self
                .config
                .include_build_version
                .then_some(self.config.build_version.as_str()),
            custom: &self.config.custom_fields,
        };

        let text = if self.config.compact {
            serde_json::to_string(&line)?
        } else {
            serde_json::to_string_pretty(&line)?
        };
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use chrono::{Local, TimeZone};
    use serde_json::Value;

    fn fixed_record(message: &str) -> LogRecord {
        let ts = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .unwrap();
        LogRecord::new("Network", Severity::Warning, message)
            .with_timestamp(ts)
            .with_thread_id(0x2a)
    }

    #[test]
    fn compact_line_fields() {
        let formatter = JsonFormatter::new(JsonConfig {
            include_session_id: false,
            include_build_version: false,
            ..JsonConfig::default()
        });
        let line = formatter.format(&fixed_record("lag spike")).unwrap();

        assert!(!line.contains('\n'));
        assert_eq!(
            line,
            r#"{"timestamp":"2024-03-09T14:05:07.000000","channel":"Network","level":"WARN","thread_id":"0000002A","message":"lag spike"}"#
        );
    }

    #[test]
    fn message_escaping_round_trips() {
        let message = "say \"quote\"\nthen\ttab and \\ backslash \r\u{8}\u{c}";
        let line = JsonFormatter::default().format(&fixed_record(message)).unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["message"], message);
        assert!(line.contains(r#"\"quote\""#));
        assert!(line.contains(r"\n"));
        assert!(line.contains(r"\t"));
        assert!(line.contains(r"\\"));
    }

    #[test]
    fn optional_fields_included() {
        let mut custom = BTreeMap::new();
        custom.insert("region".to_string(), "eu-west".to_string());
        let formatter = JsonFormatter::new(JsonConfig {
            build_version: "1.2.3".to_string(),
            custom_fields: custom,
            ..JsonConfig::default()
        });
        let parsed: Value =
            serde_json::from_str(&formatter.format(&fixed_record("m")).unwrap()).unwrap();

        assert_eq!(parsed["session_id"], session_id());
        assert_eq!(parsed["build_version"], "1.2.3");
        assert_eq!(parsed["region"], "eu-west");
        assert!(Uuid::parse_str(session_id()).is_ok());

        let mut keys: Vec<&str> = parsed
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .filter(|k| *k != "region")
            .collect();
        let mut reserved = RESERVED_FIELDS.to_vec();
        keys.sort_unstable();
        reserved.sort_unstable();
        assert_eq!(keys, reserved);
    }

    #[test]
    fn session_id_is_stable() {
        assert_eq!(session_id(), session_id());
    }

    #[test]
    fn pretty_output_uses_two_spaces() {
        let formatter = JsonFormatter::new(JsonConfig {
            compact: false,
            ..JsonConfig::default()
        });
        let line = formatter.format(&fixed_record("m")).unwrap();
        assert!(line.contains("\n  \"timestamp\""));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["level"], "WARN");
    }
}
