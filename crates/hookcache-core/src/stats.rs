//! Process-wide invalidation and warming counters.
//!
//! Updated after every request; reset only through an explicit call.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    CacheInvalidationResult, CacheWarmingResult, FailureKind, InvalidationType,
};

/// Running mean after adding `sample` as the `n`-th observation.
pub fn running_mean(old_mean: f64, n: u64, sample: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (old_mean * (n - 1) as f64 + sample) / n as f64
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvalidationStatistics {
    pub total_invalidations: u64,
    pub successful_invalidations: u64,
    pub failed_invalidations: u64,
    pub lock_rejections: u64,
    pub timeouts: u64,
    pub cache_entries_invalidated: u64,
    pub average_latency_ms: f64,
    pub by_type: BTreeMap<InvalidationType, u64>,
    pub last_invalidation_at: Option<DateTime<Utc>>,
}

impl InvalidationStatistics {
    pub fn record(&mut self, result: &CacheInvalidationResult) {
        self.total_invalidations += 1;
        if result.success {
            self.successful_invalidations += 1;
        } else {
            self.failed_invalidations += 1;
        }
        match result.failure_kind {
            Some(FailureKind::LockContention) => self.lock_rejections += 1,
            Some(FailureKind::Timeout) => self.timeouts += 1,
            _ => {}
        }
        self.cache_entries_invalidated += u64::from(result.cache_entries_invalidated);
        *self.by_type.entry(result.invalidation_type).or_default() += 1;
        self.average_latency_ms = running_mean(
            self.average_latency_ms,
            self.total_invalidations,
            result.timing.total_ms as f64,
        );
        self.last_invalidation_at = Some(Utc::now());
    }

    /// Successful share of all invalidations, 0.0 when none ran.
    pub fn success_rate(&self) -> f64 {
        if self.total_invalidations == 0 {
            0.0
        } else {
            self.successful_invalidations as f64 / self.total_invalidations as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmingStatistics {
    pub total_warmings: u64,
    pub successful_warmings: u64,
    pub failed_warmings: u64,
    pub pages_warmed: u64,
    pub cache_entries_created: u64,
    pub pages_scheduled: u64,
    pub pages_prepared: u64,
    pub average_latency_ms: f64,
    pub last_warming_at: Option<DateTime<Utc>>,
}

impl WarmingStatistics {
    pub fn record(&mut self, result: &CacheWarmingResult) {
        self.total_warmings += 1;
        if result.success {
            self.successful_warmings += 1;
        } else {
            self.failed_warmings += 1;
        }
        self.pages_warmed += u64::from(result.pages_warmed);
        self.cache_entries_created += u64::from(result.cache_entries_created);
        self.pages_scheduled += u64::from(result.pages_scheduled);
        self.pages_prepared += u64::from(result.pages_prepared);
        self.average_latency_ms = running_mean(
            self.average_latency_ms,
            self.total_warmings,
            result.total_time_ms as f64,
        );
        self.last_warming_at = Some(Utc::now());
    }
}
