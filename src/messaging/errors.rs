//! # Messaging Error Types
//!
//! Structured errors for broker operations. A read that waits out its poll
//! timeout is reported as [`MessagingError::ReadTimeout`] so consumer loops
//! can tell idleness apart from failure.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Read timed out on topic {topic} after {timeout_ms}ms")]
    ReadTimeout { topic: String, timeout_ms: u64 },

    #[error("Produce failed: {topic}: {message}")]
    Produce { topic: String, message: String },

    #[error("Flush did not complete within {timeout_ms}ms: {message}")]
    Flush { timeout_ms: u64, message: String },

    #[error("Subscription failed: {topic}: {message}")]
    Subscribe { topic: String, message: String },

    #[error("Consumer error: {topic}: {message}")]
    Consumer { topic: String, message: String },

    #[error("Topic administration failed: {operation}: {message}")]
    Admin { operation: String, message: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Consumer is not subscribed to a topic")]
    NotSubscribed,

    #[error("Unknown topic: {topic}")]
    UnknownTopic { topic: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl MessagingError {
    pub fn read_timeout(topic: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ReadTimeout {
            topic: topic.into(),
            timeout_ms,
        }
    }

    pub fn produce(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Produce {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn flush(timeout_ms: u64, message: impl Into<String>) -> Self {
        Self::Flush {
            timeout_ms,
            message: message.into(),
        }
    }

    pub fn subscribe(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn consumer(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consumer {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn admin(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Admin {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// True for an idle poll; loops ignore these silently
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout { .. })
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            Self::MessageDeserialization {
                message: err.to_string(),
            }
        } else {
            Self::MessageSerialization {
                message: err.to_string(),
            }
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_error_creation() {
        let timeout = MessagingError::read_timeout("event.prod", 1000);
        assert!(timeout.is_timeout());

        let produce = MessagingError::produce("event.retry", "broker unavailable");
        assert!(!produce.is_timeout());
        assert!(matches!(produce, MessagingError::Produce { .. }));
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let messaging_err: MessagingError = json_err.into();
        assert!(matches!(
            messaging_err,
            MessagingError::MessageDeserialization { .. }
        ));
    }

    #[test]
    fn test_error_display() {
        let err = MessagingError::subscribe("event.dlq", "unknown topic");
        let display_str = format!("{err}");
        assert!(display_str.contains("Subscription failed"));
        assert!(display_str.contains("event.dlq"));
        assert!(display_str.contains("unknown topic"));
    }
}
