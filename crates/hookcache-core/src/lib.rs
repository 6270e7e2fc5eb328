//! Cache invalidation and warming driven by validated webhooks.
//!
//! The [`InvalidationCoordinator`] locks a `(page, widget)` target, runs one
//! of four strategies against an external [`CacheBackend`] and
//! [`DependencyGraph`], and records statistics and an audit trail. The
//! [`WarmingEngine`] repopulates pages afterwards, either immediately in
//! batches, through a [`DeferredWarmingQueue`], or lazily.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hookcache_core::{
//!     CacheBackend, CacheInvalidationRequest, CoordinatorConfig, InvalidationCoordinator,
//!     InvalidationType, WarmingEngine,
//! };
//!
//! # async fn example(cache: Arc<dyn CacheBackend>) {
//! let config = CoordinatorConfig::default();
//! let coordinator = InvalidationCoordinator::new(cache.clone(), config.clone());
//! let warming = WarmingEngine::new(cache, config);
//!
//! let request = CacheInvalidationRequest::new(InvalidationType::Specific, "webhook")
//!     .for_page("strategy-plans")
//!     .for_widget("kpi-dashboard");
//! let result = coordinator.process_invalidation(&request).await;
//! if let Some(follow_up) = coordinator.follow_up_warming(&request, &result) {
//!     warming.execute_warming(&follow_up).await;
//! }
//! # }
//! ```

pub mod audit;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod deferred;
pub mod error;
pub mod lock;
pub mod stats;
pub mod types;
pub mod warming;

pub use audit::{AuditKind, AuditRecord, AuditTrail, DEFAULT_AUDIT_QUEUE};
pub use backend::{
    bounded, AuditSink, CacheBackend, DependencyGraph, DependencyTriggerReport, NoDependencies,
    CACHE_INVALIDATION_TRIGGER,
};
pub use catalog::{PageCatalog, DEFAULT_WIDGET};
pub use config::CoordinatorConfig;
pub use coordinator::InvalidationCoordinator;
pub use deferred::{
    spawn_deferred_worker, DeferredWarmingQueue, DeferredWarmingReceiver, DeferredWorkerReport,
    ScheduledWarm,
};
pub use error::{CollaboratorError, CoreError, CoreResult};
pub use lock::{lock_key, InflightLocks, LockGuard};
pub use stats::{InvalidationStatistics, WarmingStatistics};
pub use types::{
    CacheInvalidationRequest, CacheInvalidationResult, CacheWarmingRequest, CacheWarmingResult,
    FailureKind, InvalidationPhase, InvalidationType, TargetOutcome, TimingBreakdown, WarmStatus,
    WarmingStrategy, WarmingTarget, WarmingTargetOutcome, WarmingType,
};
pub use warming::WarmingEngine;
