//! Error types for topic and notification handling.

use thiserror::Error;

/// Errors that can occur when building or decoding notifications.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// A required envelope field was not set.
    #[error("notification field '{0}' is required")]
    MissingField(&'static str),

    /// The notification names a topic nobody registered.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
