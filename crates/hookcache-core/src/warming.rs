//! Cache warming engine.
//!
//! Selects pages from the request or the catalog, orders them by priority and
//! either warms them now (in batches), hands them to the deferred warming
//! queue, or marks them prepared for lazy population.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::audit::{AuditRecord, AuditTrail};
use crate::backend::{bounded, CacheBackend, DependencyGraph, NoDependencies};
use crate::catalog::DEFAULT_WIDGET;
use crate::config::CoordinatorConfig;
use crate::deferred::{DeferredWarmingQueue, ScheduledWarm};
use crate::stats::WarmingStatistics;
use crate::types::{
    CacheWarmingRequest, CacheWarmingResult, WarmStatus, WarmingStrategy, WarmingTarget,
    WarmingTargetOutcome, WarmingType,
};

pub struct WarmingEngine {
    cache: Arc<dyn CacheBackend>,
    graph: Arc<dyn DependencyGraph>,
    config: Arc<CoordinatorConfig>,
    queue: Option<DeferredWarmingQueue>,
    audit: AuditTrail,
    stats: Mutex<WarmingStatistics>,
}

impl WarmingEngine {
    pub fn new(cache: Arc<dyn CacheBackend>, config: CoordinatorConfig) -> Self {
        Self {
            cache,
            graph: Arc::new(NoDependencies),
            config: Arc::new(config),
            queue: None,
            audit: AuditTrail::disabled(),
            stats: Mutex::new(WarmingStatistics::default()),
        }
    }

    /// Graph walked by dependency-chain warming.
    pub fn with_dependency_graph(mut self, graph: Arc<dyn DependencyGraph>) -> Self {
        self.graph = graph;
        self
    }

    /// Queue receiving scheduled warming work.
    pub fn with_queue(mut self, queue: DeferredWarmingQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn stats(&self) -> MutexGuard<'_, WarmingStatistics> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn statistics(&self) -> WarmingStatistics {
        self.stats().clone()
    }

    pub fn reset_statistics(&self) {
        *self.stats() = WarmingStatistics::default();
    }

    /// Execute a warming request. Failures are reported in the result.
    pub async fn execute_warming(&self, request: &CacheWarmingRequest) -> CacheWarmingResult {
        let started = Instant::now();
        let mut result = CacheWarmingResult::new(request);

        tracing::info!(
            correlation_id = %request.correlation_id,
            warming_type = request.warming_type.as_str(),
            strategy = request.warming_strategy.as_str(),
            "cache warming started"
        );

        let targets = self.select_targets(request, &mut result).await;
        if targets.is_empty() {
            result
                .warnings
                .push("no warming targets selected".to_string());
        }

        match request.warming_strategy {
            WarmingStrategy::Immediate => self.warm_now(targets, &mut result).await,
            WarmingStrategy::Scheduled => self.schedule(request, targets, &mut result),
            WarmingStrategy::Lazy => prepare(targets, &mut result),
        }

        result.total_time_ms = elapsed_ms(started);
        result.average_page_time_ms = if result.pages_warmed == 0 {
            0.0
        } else {
            result.total_time_ms as f64 / f64::from(result.pages_warmed)
        };
        result.success = result.errors.is_empty();

        self.stats().record(&result);
        self.audit.submit(AuditRecord::from_warming(&result));

        if result.success {
            tracing::info!(
                correlation_id = %result.correlation_id,
                pages_warmed = result.pages_warmed,
                entries = result.cache_entries_created,
                scheduled = result.pages_scheduled,
                prepared = result.pages_prepared,
                total_ms = result.total_time_ms,
                "cache warming completed"
            );
        } else {
            tracing::warn!(
                correlation_id = %result.correlation_id,
                errors = result.errors.len(),
                "cache warming completed with errors"
            );
        }
        result
    }

    /// Targets for the request, sorted ascending by priority (stable).
    async fn select_targets(
        &self,
        request: &CacheWarmingRequest,
        result: &mut CacheWarmingResult,
    ) -> Vec<WarmingTarget> {
        let catalog = &self.config.catalog;
        let mut targets = match request.warming_type {
            WarmingType::Targeted => {
                if request.targets.is_empty() {
                    result
                        .errors
                        .push("targeted warming requires at least one target".to_string());
                }
                request.targets.clone()
            }
            WarmingType::TierBased => catalog
                .tier_one
                .iter()
                .map(|p| WarmingTarget::page(p.clone(), 1))
                .chain(catalog.tier_two.iter().map(|p| WarmingTarget::page(p.clone(), 2)))
                .collect(),
            WarmingType::DependencyChain => self.dependency_walk(request, result).await,
            WarmingType::FullRefresh => catalog
                .page_ids()
                .map(|p| WarmingTarget::page(p, catalog_priority(&self.config, p)))
                .collect(),
        };

        dedup_by_page(&mut targets);
        targets.sort_by_key(|t| t.priority);
        targets
    }

    /// Breadth-first walk from the request targets over page dependents.
    ///
    /// Seeds get priority 1; a page first reached at depth `d` gets `d + 1`.
    async fn dependency_walk(
        &self,
        request: &CacheWarmingRequest,
        result: &mut CacheWarmingResult,
    ) -> Vec<WarmingTarget> {
        if request.targets.is_empty() {
            result
                .errors
                .push("dependency_chain warming requires at least one seed target".to_string());
            return Vec::new();
        }

        let limit = self.config.call_timeout();
        let max_depth = self.config.max_dependency_depth;
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<(WarmingTarget, u32)> = VecDeque::new();
        let mut out = Vec::new();

        for seed in &request.targets {
            if visited.insert(seed.page_id.clone()) {
                queue.push_back((WarmingTarget { priority: 1, ..seed.clone() }, 0));
            }
        }

        while let Some((target, depth)) = queue.pop_front() {
            if depth < max_depth {
                match bounded(
                    "dependents_of",
                    limit,
                    self.graph.dependents_of(&target.page_id),
                )
                .await
                {
                    Ok(dependents) => {
                        for page in dependents {
                            if visited.insert(page.clone()) {
                                queue.push_back((WarmingTarget::page(page, depth + 2), depth + 1));
                            }
                        }
                    }
                    Err(e) => result.warnings.push(format!(
                        "dependents of {} unavailable: {}",
                        target.page_id, e
                    )),
                }
            }
            out.push(target);
        }
        out
    }

    async fn warm_now(&self, targets: Vec<WarmingTarget>, result: &mut CacheWarmingResult) {
        let batch_size = self.config.warming_batch_size.max(1);
        let batch_delay = self.config.warming_batch_delay();
        let limit = self.config.call_timeout();
        let batch_count = targets.len().div_ceil(batch_size);

        for (index, batch) in targets.chunks(batch_size).enumerate() {
            let mut join_set = JoinSet::new();
            for (slot, target) in batch.iter().enumerate() {
                let cache = Arc::clone(&self.cache);
                let widgets = widgets_for(&self.config, target);
                let target = target.clone();
                join_set.spawn(async move {
                    let outcome =
                        warm_page(cache.as_ref(), &target.page_id, &widgets, target.priority, limit)
                            .await;
                    (slot, outcome)
                });
            }

            let mut outcomes: Vec<(usize, WarmingTargetOutcome)> = Vec::with_capacity(batch.len());
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(pair) => outcomes.push(pair),
                    Err(e) => result.errors.push(format!("warming task failed: {}", e)),
                }
            }
            outcomes.sort_by_key(|(slot, _)| *slot);

            for (_, outcome) in outcomes {
                if matches!(outcome.status, WarmStatus::Warmed | WarmStatus::PartiallyWarmed) {
                    result.pages_warmed += 1;
                }
                result.cache_entries_created += outcome.entries_created;
                result.errors.extend(outcome.errors.iter().cloned());
                result.targets.push(outcome);
            }

            if index + 1 < batch_count && !batch_delay.is_zero() {
                tokio::time::sleep(batch_delay).await;
            }
        }
    }

    fn schedule(
        &self,
        request: &CacheWarmingRequest,
        targets: Vec<WarmingTarget>,
        result: &mut CacheWarmingResult,
    ) {
        if self.queue.is_none() && !targets.is_empty() {
            result.warnings.push(format!(
                "no deferred warming queue attached; {} targets recorded as scheduled only",
                targets.len()
            ));
        }

        for target in targets {
            let mut outcome = WarmingTargetOutcome {
                page_id: target.page_id.clone(),
                priority: target.priority,
                status: WarmStatus::Scheduled,
                entries_created: 0,
                duration_ms: 0,
                errors: Vec::new(),
            };
            if let Some(queue) = &self.queue {
                let job = ScheduledWarm {
                    correlation_id: request.correlation_id.clone(),
                    widget_ids: widgets_for(&self.config, &target),
                    target,
                };
                if let Err(e) = queue.enqueue(job) {
                    let message = format!("failed to schedule {}: {}", outcome.page_id, e);
                    outcome.status = WarmStatus::Failed;
                    outcome.errors.push(message.clone());
                    result.errors.push(message);
                    result.targets.push(outcome);
                    continue;
                }
            }
            result.pages_scheduled += 1;
            result.targets.push(outcome);
        }
    }
}

fn prepare(targets: Vec<WarmingTarget>, result: &mut CacheWarmingResult) {
    for target in targets {
        result.pages_prepared += 1;
        result.targets.push(WarmingTargetOutcome {
            page_id: target.page_id,
            priority: target.priority,
            status: WarmStatus::Prepared,
            entries_created: 0,
            duration_ms: 0,
            errors: Vec::new(),
        });
    }
}

/// Refresh every widget of one page. Widget failures are collected, not fatal.
pub(crate) async fn warm_page(
    cache: &dyn CacheBackend,
    page_id: &str,
    widgets: &[String],
    priority: u32,
    limit: Duration,
) -> WarmingTargetOutcome {
    let started = Instant::now();
    let mut entries_created = 0u32;
    let mut errors = Vec::new();

    for widget in widgets {
        match bounded("force_refresh", limit, cache.force_refresh(page_id, widget)).await {
            Ok(()) => entries_created += 1,
            Err(e) => {
                tracing::debug!(page_id, widget_id = %widget, error = %e, "widget warm failed");
                errors.push(format!("{}:{}: {}", page_id, widget, e));
            }
        }
    }

    let status = if errors.is_empty() {
        WarmStatus::Warmed
    } else if entries_created > 0 {
        WarmStatus::PartiallyWarmed
    } else {
        WarmStatus::Failed
    };

    WarmingTargetOutcome {
        page_id: page_id.to_string(),
        priority,
        status,
        entries_created,
        duration_ms: elapsed_ms(started),
        errors,
    }
}

/// Explicit widgets, else the catalog's, else the default widget.
fn widgets_for(config: &CoordinatorConfig, target: &WarmingTarget) -> Vec<String> {
    if !target.widget_ids.is_empty() {
        return target.widget_ids.clone();
    }
    let widgets = config.catalog.widgets(&target.page_id);
    if widgets.is_empty() {
        vec![DEFAULT_WIDGET.to_string()]
    } else {
        widgets.to_vec()
    }
}

fn catalog_priority(config: &CoordinatorConfig, page_id: &str) -> u32 {
    let catalog = &config.catalog;
    if catalog.tier_one.iter().any(|p| p == page_id) {
        1
    } else if catalog.tier_two.iter().any(|p| p == page_id) {
        2
    } else {
        3
    }
}

/// Keep the first occurrence of each page.
fn dedup_by_page(targets: &mut Vec<WarmingTarget>) {
    let mut seen = BTreeSet::new();
    targets.retain(|t| seen.insert(t.page_id.clone()));
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
