//! Error types for the coordinator and warming engine.
//!
//! Invalidation and warming never return these to their caller; failures are
//! folded into the result structures. They describe collaborator failures and
//! configuration problems.

use std::time::Duration;

/// Failure reported by (or while calling) an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Cache service failed.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Dependency graph failed.
    #[error("dependency graph error: {message}")]
    DependencyGraph { message: String },

    /// Audit sink failed.
    #[error("audit sink error: {message}")]
    Audit { message: String },

    /// Call did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

impl CollaboratorError {
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn dependency_graph(message: impl Into<String>) -> Self {
        Self::DependencyGraph {
            message: message.into(),
        }
    }

    pub fn audit(message: impl Into<String>) -> Self {
        Self::Audit {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether re-issuing the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache { .. } | Self::Timeout { .. })
    }
}

/// Core errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid configuration or catalog.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Deferred warming queue is full or closed.
    #[error("deferred warming queue unavailable: {message}")]
    QueueUnavailable { message: String },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl CoreError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
