//! Invalidation coordinator.
//!
//! Per request: take the in-flight lock for the target (rejecting duplicates),
//! optionally debounce, run the requested strategy against the cache and
//! dependency graph, then update statistics and submit an audit record. The
//! lock is held by a guard, so it is released on every exit path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info_span, Instrument};

use crate::audit::{AuditRecord, AuditTrail};
use crate::backend::{
    bounded, CacheBackend, DependencyGraph, NoDependencies, CACHE_INVALIDATION_TRIGGER,
};
use crate::catalog::DEFAULT_WIDGET;
use crate::config::CoordinatorConfig;
use crate::error::CollaboratorError;
use crate::lock::InflightLocks;
use crate::stats::InvalidationStatistics;
use crate::types::{
    CacheInvalidationRequest, CacheInvalidationResult, CacheWarmingRequest, FailureKind,
    InvalidationPhase, InvalidationType, TargetOutcome, WarmingStrategy, WarmingTarget,
    WarmingType,
};
use crate::warming::elapsed_ms;

pub struct InvalidationCoordinator {
    cache: Arc<dyn CacheBackend>,
    graph: Arc<dyn DependencyGraph>,
    config: Arc<CoordinatorConfig>,
    locks: InflightLocks,
    audit: AuditTrail,
    stats: Mutex<InvalidationStatistics>,
}

impl InvalidationCoordinator {
    pub fn new(cache: Arc<dyn CacheBackend>, config: CoordinatorConfig) -> Self {
        Self {
            cache,
            graph: Arc::new(NoDependencies),
            config: Arc::new(config),
            locks: InflightLocks::new(),
            audit: AuditTrail::disabled(),
            stats: Mutex::new(InvalidationStatistics::default()),
        }
    }

    pub fn with_dependency_graph(mut self, graph: Arc<dyn DependencyGraph>) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = audit;
        self
    }

    /// Share the in-flight set with other coordinators.
    pub fn with_locks(mut self, locks: InflightLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn locks(&self) -> &InflightLocks {
        &self.locks
    }

    /// Keys currently being invalidated.
    pub fn in_flight(&self) -> Vec<String> {
        self.locks.held_keys()
    }

    fn stats(&self) -> MutexGuard<'_, InvalidationStatistics> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn statistics(&self) -> InvalidationStatistics {
        self.stats().clone()
    }

    pub fn reset_statistics(&self) {
        *self.stats() = InvalidationStatistics::default();
    }

    /// Process one invalidation request.
    ///
    /// Never fails outward: errors, warnings and the failure kind are carried
    /// by the result, and timing is always filled in. Collaborator panics are
    /// not caught, but the target lock is still released while unwinding.
    pub async fn process_invalidation(
        &self,
        request: &CacheInvalidationRequest,
    ) -> CacheInvalidationResult {
        let lock_key = request.lock_key();
        let span = info_span!(
            "cache.invalidation",
            correlation_id = %request.correlation_id,
            lock_key = %lock_key,
            invalidation_type = request.invalidation_type.as_str(),
            trigger_source = %request.trigger_source,
            success = tracing::field::Empty,
        );

        async move {
            let started = Instant::now();
            let mut result = CacheInvalidationResult::new(request, lock_key.clone());

            let Some(guard) = self.locks.try_acquire(&lock_key) else {
                result.phase = InvalidationPhase::Rejected;
                result.fail(
                    FailureKind::LockContention,
                    format!("invalidation already in progress for {}", lock_key),
                );
                tracing::warn!("duplicate invalidation rejected");
                return self.finish(request, result, started);
            };
            result.phase = InvalidationPhase::Locked;
            result.timing.lock_wait_ms = elapsed_ms(started);
            tracing::debug!("invalidation lock acquired");

            if let Some(ms) = request.effective_delay_ms() {
                let delay_started = Instant::now();
                tokio::time::sleep(Duration::from_millis(ms)).await;
                result.timing.delay_ms = elapsed_ms(delay_started);
            }

            result.phase = InvalidationPhase::Executing;
            let exec_started = Instant::now();
            match request.invalidation_type {
                InvalidationType::Specific => self.specific(request, &mut result).await,
                InvalidationType::PageWide => self.page_wide(request, &mut result).await,
                InvalidationType::DependencyChain => {
                    self.dependency_chain(request, &mut result).await
                }
                InvalidationType::FullSite => self.full_site(&mut result).await,
            }
            result.timing.execution_ms = elapsed_ms(exec_started);
            result.phase = if result.success {
                InvalidationPhase::Completed
            } else {
                InvalidationPhase::Failed
            };

            drop(guard);
            self.finish(request, result, started)
        }
        .instrument(span)
        .await
    }

    fn finish(
        &self,
        request: &CacheInvalidationRequest,
        mut result: CacheInvalidationResult,
        started: Instant,
    ) -> CacheInvalidationResult {
        result.timing.total_ms = elapsed_ms(started);
        tracing::Span::current().record("success", result.success);

        self.stats().record(&result);
        self.audit
            .submit(AuditRecord::from_invalidation(&request.trigger_source, &result));

        if result.success {
            tracing::info!(
                entries = result.cache_entries_invalidated,
                dependencies = result.dependencies_processed,
                warnings = result.warnings.len(),
                total_ms = result.timing.total_ms,
                "invalidation completed"
            );
        } else if result.phase != InvalidationPhase::Rejected {
            tracing::warn!(
                failure_kind = ?result.failure_kind,
                errors = ?result.errors,
                "invalidation failed"
            );
        }
        result
    }

    async fn specific(&self, request: &CacheInvalidationRequest, result: &mut CacheInvalidationResult) {
        let Some(page_id) = require_page(request, result) else {
            return;
        };
        let widget_id = request.target_widget_id.as_deref().unwrap_or(DEFAULT_WIDGET);

        match self.refresh_entry(page_id, widget_id, result).await {
            Ok(()) => result.success = true,
            Err(e) => result.fail(failure_kind(&e), format!("{}:{}: {}", page_id, widget_id, e)),
        }
    }

    /// Each widget independently; widget failures are warnings, a timeout aborts.
    async fn page_wide(&self, request: &CacheInvalidationRequest, result: &mut CacheInvalidationResult) {
        let Some(page_id) = require_page(request, result) else {
            return;
        };
        let widgets = self.config.catalog.widgets(page_id);
        if widgets.is_empty() {
            result.fail(
                FailureKind::Precondition,
                format!("page {} has no widgets in the catalog", page_id),
            );
            return;
        }

        for widget_id in widgets {
            match self.refresh_entry(page_id, widget_id, result).await {
                Ok(()) => {}
                Err(e) if e.is_timeout() => {
                    result.fail(FailureKind::Timeout, format!("{}:{}: {}", page_id, widget_id, e));
                    return;
                }
                Err(e) => result.warn(format!("{}:{}: {}", page_id, widget_id, e)),
            }
        }

        result.success = result.cache_entries_invalidated > 0 && result.errors.is_empty();
        if !result.success && result.errors.is_empty() {
            result.fail(
                FailureKind::Collaborator,
                format!("no widgets of {} could be invalidated", page_id),
            );
        }
    }

    /// Fan out through the dependency graph, then invalidate the source entry.
    async fn dependency_chain(
        &self,
        request: &CacheInvalidationRequest,
        result: &mut CacheInvalidationResult,
    ) {
        let Some(page_id) = require_page(request, result) else {
            return;
        };
        let widget = request.target_widget_id.as_deref();

        let fan_out = bounded(
            "trigger_dependencies",
            self.config.call_timeout(),
            self.graph.trigger_dependencies(
                page_id,
                widget,
                CACHE_INVALIDATION_TRIGGER,
                &request.correlation_id,
            ),
        )
        .await;

        let graph_ok = match fan_out {
            Ok(report) => {
                result.dependencies_processed = report.triggered_dependencies;
                result.cross_page_invalidations = report.invalidations_performed;
                let clean = report.errors.is_empty();
                for error in report.errors {
                    result.fail(FailureKind::Collaborator, format!("dependency: {}", error));
                }
                clean
            }
            Err(e) if e.is_timeout() => {
                result.fail(FailureKind::Timeout, e.to_string());
                return;
            }
            Err(e) => {
                result.fail(FailureKind::Collaborator, e.to_string());
                false
            }
        };

        let widget_id = widget.unwrap_or(DEFAULT_WIDGET);
        let source_ok = match self.refresh_entry(page_id, widget_id, result).await {
            Ok(()) => true,
            Err(e) => {
                result.fail(failure_kind(&e), format!("{}:{}: {}", page_id, widget_id, e));
                false
            }
        };

        result.success = graph_ok && source_ok;
    }

    /// Clear everything once, then mark the critical pages' widgets.
    async fn full_site(&self, result: &mut CacheInvalidationResult) {
        let clear_started = Instant::now();
        if let Err(e) = bounded(
            "clear_all_cache",
            self.config.call_timeout(),
            self.cache.clear_all_cache(),
        )
        .await
        {
            result.fail(failure_kind(&e), e.to_string());
            return;
        }
        let clear_ms = elapsed_ms(clear_started);

        let catalog = &self.config.catalog;
        for page_id in &catalog.critical_pages {
            for widget_id in catalog.widgets(page_id) {
                result.cache_entries_invalidated += 1;
                result.targets.push(TargetOutcome {
                    page_id: page_id.clone(),
                    widget_id: widget_id.clone(),
                    success: true,
                    error: None,
                    duration_ms: clear_ms,
                });
            }
        }
        result.success = true;
    }

    async fn refresh_entry(
        &self,
        page_id: &str,
        widget_id: &str,
        result: &mut CacheInvalidationResult,
    ) -> Result<(), CollaboratorError> {
        let started = Instant::now();
        let outcome = bounded(
            "force_refresh",
            self.config.call_timeout(),
            self.cache.force_refresh(page_id, widget_id),
        )
        .await;

        result.targets.push(TargetOutcome {
            page_id: page_id.to_string(),
            widget_id: widget_id.to_string(),
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
            duration_ms: elapsed_ms(started),
        });
        if outcome.is_ok() {
            result.cache_entries_invalidated += 1;
        }
        outcome
    }

    /// Warming request to run after a successful invalidation, if any.
    pub fn follow_up_warming(
        &self,
        request: &CacheInvalidationRequest,
        result: &CacheInvalidationResult,
    ) -> Option<CacheWarmingRequest> {
        if !result.success {
            return None;
        }

        let warming = match (request.invalidation_type, request.target_page_id.as_deref()) {
            (InvalidationType::FullSite, _) => {
                CacheWarmingRequest::new(WarmingType::TierBased, WarmingStrategy::Immediate)
            }
            (InvalidationType::Specific, Some(page)) => {
                let widget = request.target_widget_id.as_deref().unwrap_or(DEFAULT_WIDGET);
                CacheWarmingRequest::new(WarmingType::Targeted, WarmingStrategy::Immediate)
                    .with_target(WarmingTarget::page(page, 1).with_widgets([widget]))
            }
            (InvalidationType::PageWide, Some(page)) => {
                CacheWarmingRequest::new(WarmingType::Targeted, WarmingStrategy::Immediate)
                    .with_target(WarmingTarget::page(page, 1))
            }
            (InvalidationType::DependencyChain, Some(page)) => {
                CacheWarmingRequest::new(WarmingType::DependencyChain, WarmingStrategy::Immediate)
                    .with_target(WarmingTarget::page(page, 1))
            }
            (_, None) => return None,
        };

        Some(
            warming
                .with_correlation_id(request.correlation_id.clone())
                .with_reason(format!(
                    "follow-up to {} invalidation",
                    request.invalidation_type.as_str()
                )),
        )
    }
}

fn require_page<'a>(
    request: &'a CacheInvalidationRequest,
    result: &mut CacheInvalidationResult,
) -> Option<&'a str> {
    match request.target_page_id.as_deref() {
        Some(page) if !page.is_empty() => Some(page),
        _ => {
            result.fail(
                FailureKind::Precondition,
                format!(
                    "{} invalidation requires target_page_id",
                    request.invalidation_type.as_str()
                ),
            );
            None
        }
    }
}

fn failure_kind(error: &CollaboratorError) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Collaborator
    }
}
