//! Builder for key/value log messages.
//!
//! ```no_run
//! # use quill_core::{Pipeline, QuillConfig, Severity};
//! # let pipeline = Pipeline::start(QuillConfig::default()).unwrap();
//! pipeline
//!     .structured("Network", Severity::Warning)
//!     .function("reconnect")
//!     .field("attempt", 3)
//!     .field("peer", "10.0.0.7")
//!     .commit();
//! // message: "reconnect: attempt=3, peer=10.0.0.7"
//! ```

use std::fmt::{self, Display, Write as _};

use crate::pipeline::{Pipeline, SubmitOutcome};
use crate::types::Severity;

/// Accumulates a message and submits it on [`StructuredLog::commit`] or drop.
#[must_use = "the record is submitted when the builder is committed or dropped"]
pub struct StructuredLog<'a> {
    pipeline: &'a Pipeline,
    channel: String,
    severity: Severity,
    function: Option<String>,
    fields: Vec<(String, String)>,
    committed: bool,
}

impl<'a> StructuredLog<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline, channel: &str, severity: Severity) -> Self {
        Self {
            pipeline,
            channel: channel.to_string(),
            severity,
            function: None,
            fields: Vec::new(),
            committed: false,
        }
    }

    /// Prefixes the message with a function name.
    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    /// Appends a `key=value` pair.
    pub fn field(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// The message as it would be submitted.
    pub fn message(&self) -> String {
        let mut message = String::new();
        if let Some(function) = &self.function {
            message.push_str(function);
            if !self.fields.is_empty() {
                message.push_str(": ");
            }
        }
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                message.push_str(", ");
            }
            let _ = write!(message, "{key}={value}");
        }
        message
    }

    /// Submits the record.
    pub fn commit(mut self) -> SubmitOutcome {
        self.submit()
    }

    fn submit(&mut self) -> SubmitOutcome {
        self.committed = true;
        let message = self.message();
        self.pipeline.log(&self.channel, self.severity, message)
    }
}

impl fmt::Debug for StructuredLog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredLog")
            .field("channel", &self.channel)
            .field("severity", &self.severity)
            .field("message", &self.message())
            .field("committed", &self.committed)
            .finish()
    }
}

impl Drop for StructuredLog<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.submit();
        }
    }
}
