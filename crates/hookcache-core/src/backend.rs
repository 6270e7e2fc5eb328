//! Collaborator seams: the cache being invalidated, the dependency graph used
//! for chain invalidation, and the durable audit sink.
//!
//! All calls into collaborators go through [`bounded`], so a hung service
//! cannot hold an invalidation lock indefinitely.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::error::CollaboratorError;

/// Trigger type passed to the dependency graph by chain invalidation.
pub const CACHE_INVALIDATION_TRIGGER: &str = "cache_invalidation";

/// The response cache owned by the page-rendering layer.
///
/// Refreshing an entry that is not cached must succeed as a no-op.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Invalidate and repopulate one `(page, widget)` entry.
    async fn force_refresh(&self, page_id: &str, widget_id: &str) -> Result<(), CollaboratorError>;

    /// Drop every cached entry.
    async fn clear_all_cache(&self) -> Result<(), CollaboratorError>;
}

/// What the dependency graph did for one trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTriggerReport {
    pub triggered_dependencies: u32,
    pub invalidations_performed: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Graph of pages/widgets deriving data from one another.
#[async_trait]
pub trait DependencyGraph: Send + Sync {
    /// Invalidate everything depending on `(page, widget)`.
    async fn trigger_dependencies(
        &self,
        page_id: &str,
        widget_id: Option<&str>,
        trigger_type: &str,
        correlation_id: &str,
    ) -> Result<DependencyTriggerReport, CollaboratorError>;

    /// Pages directly depending on `page_id`. Used by dependency-chain warming.
    async fn dependents_of(&self, _page_id: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(Vec::new())
    }
}

/// Graph with no edges, used when no dependency service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

#[async_trait]
impl DependencyGraph for NoDependencies {
    async fn trigger_dependencies(
        &self,
        _page_id: &str,
        _widget_id: Option<&str>,
        _trigger_type: &str,
        _correlation_id: &str,
    ) -> Result<DependencyTriggerReport, CollaboratorError> {
        Ok(DependencyTriggerReport::default())
    }
}

/// Durable, best-effort audit storage.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), CollaboratorError>;

    fn name(&self) -> &'static str {
        "audit-sink"
    }
}

/// Await a collaborator call for at most `limit`.
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            operation: operation.to_string(),
            after: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let ok = bounded("op", Duration::from_secs(1), async { Ok::<_, CollaboratorError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = bounded("op", Duration::from_secs(1), async {
            Err::<(), _>(CollaboratorError::cache("down"))
        })
        .await;
        assert_eq!(err, Err(CollaboratorError::cache("down")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result = bounded("force_refresh", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, CollaboratorError>(())
        })
        .await;
        assert!(matches!(
            result,
            Err(CollaboratorError::Timeout { ref operation, .. }) if operation == "force_refresh"
        ));
    }

    #[tokio::test]
    async fn test_no_dependencies() {
        let graph = NoDependencies;
        let report = graph
            .trigger_dependencies("strategy-plans", None, CACHE_INVALIDATION_TRIGGER, "c-1")
            .await
            .unwrap();
        assert_eq!(report, DependencyTriggerReport::default());
        assert!(graph.dependents_of("strategy-plans").await.unwrap().is_empty());
    }
}
