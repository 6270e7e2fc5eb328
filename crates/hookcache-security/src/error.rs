//! Error types for the security layer.
//!
//! Validation outcomes are never errors: a rejected webhook is a
//! [`ValidationResult`](crate::ValidationResult) with `valid == false`.
//! These errors cover configuration and the internals behind the validator.

use std::time::Duration;

/// Security layer errors.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Unexpected internal failure while validating.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Durable event sink failed.
    #[error("event sink error: {message}")]
    Sink { message: String },

    /// Durable event sink did not answer in time.
    #[error("event sink timed out after {after:?}")]
    SinkTimeout { after: Duration },
}

impl SecurityError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Sink { .. } | Self::SinkTimeout { .. })
    }
}

impl From<std::io::Error> for SecurityError {
    fn from(err: std::io::Error) -> Self {
        Self::Sink {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SecurityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Sink {
            message: err.to_string(),
        }
    }
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;
