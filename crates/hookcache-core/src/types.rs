//! Invalidation and warming requests and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==================== Invalidation ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationType {
    /// One `(page, widget)` entry.
    Specific,
    /// Every known widget of a page.
    PageWide,
    /// Dependents via the dependency graph, then the source entry.
    DependencyChain,
    /// Entire cache.
    FullSite,
}

impl InvalidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specific => "specific",
            Self::PageWide => "page_wide",
            Self::DependencyChain => "dependency_chain",
            Self::FullSite => "full_site",
        }
    }
}

/// Request built by the orchestration layer from a validated webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInvalidationRequest {
    pub correlation_id: String,
    pub trigger_source: String,
    pub invalidation_type: InvalidationType,
    #[serde(default)]
    pub target_page_id: Option<String>,
    #[serde(default)]
    pub target_widget_id: Option<String>,
    #[serde(default)]
    pub reason: String,
    /// Skip `delay_ms`.
    #[serde(default)]
    pub force_immediate: bool,
    /// Debounce delay applied after the lock is taken.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl CacheInvalidationRequest {
    /// New request with a generated correlation id.
    pub fn new(invalidation_type: InvalidationType, trigger_source: impl Into<String>) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            trigger_source: trigger_source.into(),
            invalidation_type,
            target_page_id: None,
            target_widget_id: None,
            reason: String::new(),
            force_immediate: false,
            delay_ms: None,
        }
    }

    pub fn for_page(mut self, page_id: impl Into<String>) -> Self {
        self.target_page_id = Some(page_id.into());
        self
    }

    pub fn for_widget(mut self, widget_id: impl Into<String>) -> Self {
        self.target_widget_id = Some(widget_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn immediate(mut self) -> Self {
        self.force_immediate = true;
        self
    }

    /// `(page | global):(widget | all)`.
    pub fn lock_key(&self) -> String {
        crate::lock::lock_key(
            self.target_page_id.as_deref(),
            self.target_widget_id.as_deref(),
        )
    }

    /// Delay to apply, if any.
    pub fn effective_delay_ms(&self) -> Option<u64> {
        if self.force_immediate {
            None
        } else {
            self.delay_ms.filter(|ms| *ms > 0)
        }
    }
}

/// Classification of what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Same target already in flight; retry later, not immediately.
    LockContention,
    /// Strategy precondition violated (e.g. missing target page).
    Precondition,
    /// A collaborator reported an error.
    Collaborator,
    /// A collaborator call timed out.
    Timeout,
    /// Some sub-operations failed; the result may still be successful.
    Partial,
}

/// Lifecycle of one invalidation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPhase {
    Pending,
    Locked,
    Executing,
    Completed,
    Failed,
    /// Never locked: rejected on contention.
    Rejected,
}

/// Outcome for one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub page_id: String,
    pub widget_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Where the time went, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub lock_wait_ms: u64,
    pub delay_ms: u64,
    pub execution_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInvalidationResult {
    pub correlation_id: String,
    pub invalidation_type: InvalidationType,
    pub lock_key: String,
    pub success: bool,
    pub phase: InvalidationPhase,
    pub cache_entries_invalidated: u32,
    pub dependencies_processed: u32,
    pub cross_page_invalidations: u32,
    pub targets: Vec<TargetOutcome>,
    pub timing: TimingBreakdown,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Most severe failure seen; `Partial` may accompany a successful result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub started_at: DateTime<Utc>,
}

impl CacheInvalidationResult {
    pub(crate) fn new(request: &CacheInvalidationRequest, lock_key: String) -> Self {
        Self {
            correlation_id: request.correlation_id.clone(),
            invalidation_type: request.invalidation_type,
            lock_key,
            success: false,
            phase: InvalidationPhase::Pending,
            cache_entries_invalidated: 0,
            dependencies_processed: 0,
            cross_page_invalidations: 0,
            targets: Vec::new(),
            timing: TimingBreakdown::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            failure_kind: None,
            started_at: Utc::now(),
        }
    }

    pub(crate) fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        self.errors.push(message.into());
        self.failure_kind = Some(kind);
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
        if self.failure_kind.is_none() {
            self.failure_kind = Some(FailureKind::Partial);
        }
    }
}

// ==================== Warming ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmingType {
    /// Explicit target list.
    Targeted,
    /// Catalog tier one, then tier two.
    TierBased,
    /// Request targets plus their dependents, breadth first.
    DependencyChain,
    /// Every catalog page.
    FullRefresh,
}

impl WarmingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Targeted => "targeted",
            Self::TierBased => "tier_based",
            Self::DependencyChain => "dependency_chain",
            Self::FullRefresh => "full_refresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmingStrategy {
    /// Warm now, in batches.
    Immediate,
    /// Hand targets to the deferred warming queue.
    Scheduled,
    /// Mark prepared; entries populate on next read.
    Lazy,
}

impl WarmingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Scheduled => "scheduled",
            Self::Lazy => "lazy",
        }
    }
}

/// A page to warm. Lower priority values are warmed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmingTarget {
    pub page_id: String,
    /// Widgets to warm; empty means every catalog widget of the page.
    #[serde(default)]
    pub widget_ids: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 {
    1
}

impl WarmingTarget {
    pub fn page(page_id: impl Into<String>, priority: u32) -> Self {
        Self {
            page_id: page_id.into(),
            widget_ids: Vec::new(),
            priority,
        }
    }

    pub fn with_widgets<I, S>(mut self, widgets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.widget_ids = widgets.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheWarmingRequest {
    pub correlation_id: String,
    pub warming_type: WarmingType,
    pub warming_strategy: WarmingStrategy,
    #[serde(default)]
    pub targets: Vec<WarmingTarget>,
    #[serde(default)]
    pub reason: String,
}

impl CacheWarmingRequest {
    pub fn new(warming_type: WarmingType, warming_strategy: WarmingStrategy) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            warming_type,
            warming_strategy,
            targets: Vec::new(),
            reason: String::new(),
        }
    }

    pub fn with_target(mut self, target: WarmingTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmStatus {
    Warmed,
    PartiallyWarmed,
    Failed,
    Scheduled,
    Prepared,
}

/// Outcome for one warmed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmingTargetOutcome {
    pub page_id: String,
    pub priority: u32,
    pub status: WarmStatus,
    pub entries_created: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheWarmingResult {
    pub correlation_id: String,
    pub warming_type: WarmingType,
    pub warming_strategy: WarmingStrategy,
    pub success: bool,
    pub pages_warmed: u32,
    pub cache_entries_created: u32,
    pub pages_scheduled: u32,
    pub pages_prepared: u32,
    pub average_page_time_ms: f64,
    pub total_time_ms: u64,
    pub targets: Vec<WarmingTargetOutcome>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl CacheWarmingResult {
    pub(crate) fn new(request: &CacheWarmingRequest) -> Self {
        Self {
            correlation_id: request.correlation_id.clone(),
            warming_type: request.warming_type,
            warming_strategy: request.warming_strategy,
            success: false,
            pages_warmed: 0,
            cache_entries_created: 0,
            pages_scheduled: 0,
            pages_prepared: 0,
            average_page_time_ms: 0.0,
            total_time_ms: 0,
            targets: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
        }
    }
}
