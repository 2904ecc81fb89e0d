//! Error types for the logging pipeline.
//!
//! Nothing on the producer path returns these: admission, queueing and
//! storage report their outcome through [`SubmitOutcome`](crate::SubmitOutcome)
//! and [`InsertOutcome`](crate::InsertOutcome). Errors surface from the
//! management operations (channel registration, configuration, file
//! maintenance, worker startup).

use thiserror::Error;

/// Errors that can occur in the logging pipeline.
#[derive(Debug, Error)]
pub enum LogError {
    /// The named channel is not registered.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The named channel is protected and cannot be removed.
    #[error("channel is protected: {0}")]
    ProtectedChannel(String),

    /// The channel is outside the allow-list of known channels.
    #[error("channel not allowed: {0}")]
    ChannelNotAllowed(String),

    /// The channel name is empty or malformed.
    #[error("invalid channel name: {0:?}")]
    InvalidChannelName(String),

    /// A bounded queue is at capacity.
    #[error("queue full (capacity {capacity})")]
    QueueFull {
        /// Capacity of the queue that rejected the item.
        capacity: usize,
    },

    /// A record does not fit in the memory budget even after trimming.
    #[error("memory budget exceeded: need {needed} bytes, budget is {budget} bytes")]
    BudgetExceeded {
        /// Bytes the pending insert would need.
        needed: u64,
        /// Configured budget in bytes.
        budget: u64,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A worker thread could not be spawned.
    #[error("failed to start {stage} thread: {source}")]
    ThreadStart {
        /// Pipeline stage whose worker failed to start.
        stage: &'static str,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = LogError::ChannelNotFound("Gameplay.AI".to_string());
        assert_eq!(err.to_string(), "channel not found: Gameplay.AI");

        let err = LogError::ProtectedChannel("Default".to_string());
        assert_eq!(err.to_string(), "channel is protected: Default");

        let err = LogError::QueueFull { capacity: 100 };
        assert_eq!(err.to_string(), "queue full (capacity 100)");

        let err = LogError::BudgetExceeded {
            needed: 512,
            budget: 256,
        };
        assert_eq!(
            err.to_string(),
            "memory budget exceeded: need 512 bytes, budget is 256 bytes"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogError>();
    }

    #[test]
    fn invalid_channel_name_is_quoted() {
        let err = LogError::InvalidChannelName(String::new());
        assert_eq!(err.to_string(), "invalid channel name: \"\"");
    }

    #[test]
    fn thread_start_keeps_source() {
        use std::error::Error as _;

        let err = LogError::ThreadStart {
            stage: "writer",
            source: std::io::Error::other("no threads left"),
        };
        assert!(err.to_string().contains("writer"));
        assert!(err.source().is_some());
    }

    #[test]
    fn error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LogError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn error_serialization_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LogError = json_err.into();
        assert!(matches!(err, LogError::Serialization(_)));
    }
}
