//! Per-client rate-limit windows.
//!
//! Three budgets are tracked per client identifier:
//!
//! - burst: sliding window with an explicit `window_start` reset
//! - per minute: bucket `floor(now / 60s)`
//! - per hour: bucket `floor(now / 3600s)`
//!
//! Windows are created lazily and never deleted explicitly. Stale windows are
//! swept either probabilistically on the request path or via [`RateLimitStore::sweep`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;

/// Chance that a request triggers a sweep of stale windows.
const SWEEP_PROBABILITY: f64 = 0.01;

/// Which budget was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Burst,
    PerMinute,
    PerHour,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Burst => "burst",
            Self::PerMinute => "per_minute",
            Self::PerHour => "per_hour",
        }
    }
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of an exhausted budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit_type: LimitType,
    /// Requests already counted in the window.
    pub current_count: u32,
    pub limit: u32,
    /// When the exhausted window rolls over.
    pub reset_at: DateTime<Utc>,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    /// Request counted; `remaining` is the per-minute budget left.
    Allowed { remaining: u32 },
    /// Request rejected, nothing counted.
    Limited(RateLimitStatus),
}

#[derive(Debug, Clone, Copy)]
struct BurstWindow {
    count: u32,
    window_start_ms: i64,
}

#[derive(Debug, Default)]
struct Windows {
    minute: HashMap<(String, i64), u32>,
    hour: HashMap<(String, i64), u32>,
    burst: HashMap<String, BurstWindow>,
}

/// Explicitly owned rate-limit state, shared by reference with the validator.
#[derive(Debug)]
pub struct RateLimitStore {
    limits: RateLimitConfig,
    windows: Mutex<Windows>,
    sweep_probability: f64,
}

impl RateLimitStore {
    pub fn new(limits: RateLimitConfig) -> Self {
        Self {
            limits,
            windows: Mutex::new(Windows::default()),
            sweep_probability: SWEEP_PROBABILITY,
        }
    }

    /// Disable the probabilistic sweep (tests that inspect window counts).
    pub fn without_random_sweep(mut self) -> Self {
        self.sweep_probability = 0.0;
        self
    }

    pub fn limits(&self) -> &RateLimitConfig {
        &self.limits
    }

    fn lock(&self) -> MutexGuard<'_, Windows> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check all budgets for `client` and count the request if none is exhausted.
    ///
    /// Budgets are checked burst, per-minute, per-hour; the first exhausted one
    /// is reported.
    pub fn check_and_record(&self, client: &str, now: DateTime<Utc>) -> RateDecision {
        let now_ms = now.timestamp_millis();
        let burst_window_ms = self.limits.burst_window_ms();
        let minute_bucket = now_ms.div_euclid(MINUTE_MS);
        let hour_bucket = now_ms.div_euclid(HOUR_MS);

        let sweep = self.sweep_probability > 0.0
            && rand::thread_rng().gen_bool(self.sweep_probability);

        let mut windows = self.lock();
        if sweep {
            let removed = sweep_windows(&mut windows, now_ms, burst_window_ms);
            tracing::debug!(removed, "swept stale rate-limit windows");
        }

        let burst = windows
            .burst
            .entry(client.to_string())
            .or_insert(BurstWindow {
                count: 0,
                window_start_ms: now_ms,
            });
        if now_ms - burst.window_start_ms >= burst_window_ms {
            burst.count = 0;
            burst.window_start_ms = now_ms;
        }
        if burst.count >= self.limits.burst_limit {
            return RateDecision::Limited(RateLimitStatus {
                limit_type: LimitType::Burst,
                current_count: burst.count,
                limit: self.limits.burst_limit,
                reset_at: millis_to_datetime(
                    burst.window_start_ms.saturating_add(burst_window_ms),
                ),
            });
        }
        let burst_snapshot = *burst;

        let minute_key = (client.to_string(), minute_bucket);
        let minute_count = windows.minute.get(&minute_key).copied().unwrap_or(0);
        if minute_count >= self.limits.per_minute {
            return RateDecision::Limited(RateLimitStatus {
                limit_type: LimitType::PerMinute,
                current_count: minute_count,
                limit: self.limits.per_minute,
                reset_at: millis_to_datetime((minute_bucket + 1) * MINUTE_MS),
            });
        }

        let hour_key = (client.to_string(), hour_bucket);
        let hour_count = windows.hour.get(&hour_key).copied().unwrap_or(0);
        if hour_count >= self.limits.per_hour {
            return RateDecision::Limited(RateLimitStatus {
                limit_type: LimitType::PerHour,
                current_count: hour_count,
                limit: self.limits.per_hour,
                reset_at: millis_to_datetime((hour_bucket + 1) * HOUR_MS),
            });
        }

        windows.burst.insert(
            client.to_string(),
            BurstWindow {
                count: burst_snapshot.count + 1,
                window_start_ms: burst_snapshot.window_start_ms,
            },
        );
        windows.minute.insert(minute_key, minute_count + 1);
        windows.hour.insert(hour_key, hour_count + 1);

        RateDecision::Allowed {
            remaining: self.limits.per_minute - (minute_count + 1),
        }
    }

    /// Drop windows that can no longer affect a decision at `now`.
    ///
    /// Returns the number of windows removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let burst_window_ms = self.limits.burst_window_ms();
        sweep_windows(&mut self.lock(), now.timestamp_millis(), burst_window_ms)
    }

    /// Number of live windows across all three kinds.
    pub fn tracked_windows(&self) -> usize {
        let windows = self.lock();
        windows.minute.len() + windows.hour.len() + windows.burst.len()
    }

    /// Forget all counters.
    pub fn reset(&self) {
        *self.lock() = Windows::default();
    }
}

fn sweep_windows(windows: &mut Windows, now_ms: i64, burst_window_ms: i64) -> usize {
    let before = windows.minute.len() + windows.hour.len() + windows.burst.len();
    let minute_bucket = now_ms.div_euclid(MINUTE_MS);
    let hour_bucket = now_ms.div_euclid(HOUR_MS);

    windows.minute.retain(|(_, bucket), _| *bucket >= minute_bucket);
    windows.hour.retain(|(_, bucket), _| *bucket >= hour_bucket);
    windows
        .burst
        .retain(|_, w| now_ms - w.window_start_ms < burst_window_ms);

    before - (windows.minute.len() + windows.hour.len() + windows.burst.len())
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store(per_minute: u32, per_hour: u32, burst: u32) -> RateLimitStore {
        RateLimitStore::new(RateLimitConfig {
            per_minute,
            per_hour,
            burst_limit: burst,
            burst_window_secs: 10,
        })
        .without_random_sweep()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_burst_limit_plus_one_rejected() {
        let s = store(100, 1000, 5);
        let t0 = 1_700_000_000_000;
        for i in 0..5 {
            assert!(matches!(
                s.check_and_record("1.2.3.4", at(t0 + i * 100)),
                RateDecision::Allowed { .. }
            ));
        }
        match s.check_and_record("1.2.3.4", at(t0 + 600)) {
            RateDecision::Limited(status) => {
                assert_eq!(status.limit_type, LimitType::Burst);
                assert_eq!(status.current_count, 5);
                assert_eq!(status.reset_at, at(t0 + 10_000));
            }
            other => panic!("expected burst limit, got {:?}", other),
        }
    }

    #[test]
    fn test_burst_window_resets() {
        let s = store(100, 1000, 2);
        let t0 = 1_700_000_000_000;
        s.check_and_record("c", at(t0));
        s.check_and_record("c", at(t0 + 1));
        assert!(matches!(
            s.check_and_record("c", at(t0 + 2)),
            RateDecision::Limited(_)
        ));
        assert!(matches!(
            s.check_and_record("c", at(t0 + 10_000)),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_minute_bucket_boundary() {
        let s = store(1, 1000, 100);
        // Start of a minute bucket.
        let t = 1_700_000_040_000 - 1_700_000_040_000 % MINUTE_MS;
        assert_eq!(
            s.check_and_record("c", at(t)),
            RateDecision::Allowed { remaining: 0 }
        );
        assert!(matches!(
            s.check_and_record("c", at(t + 59_999)),
            RateDecision::Limited(RateLimitStatus {
                limit_type: LimitType::PerMinute,
                ..
            })
        ));
        assert_eq!(
            s.check_and_record("c", at(t + 60_000)),
            RateDecision::Allowed { remaining: 0 }
        );
    }

    #[test]
    fn test_hour_limit() {
        let s = store(100, 3, 100);
        let t = 1_700_000_000_000 - 1_700_000_000_000 % HOUR_MS;
        for i in 0..3 {
            assert!(matches!(
                s.check_and_record("c", at(t + i * MINUTE_MS)),
                RateDecision::Allowed { .. }
            ));
        }
        match s.check_and_record("c", at(t + 10 * MINUTE_MS)) {
            RateDecision::Limited(status) => {
                assert_eq!(status.limit_type, LimitType::PerHour);
                assert_eq!(status.current_count, 3);
                assert_eq!(status.reset_at, at(t + HOUR_MS));
            }
            other => panic!("expected hour limit, got {:?}", other),
        }
    }

    #[test]
    fn test_hour_bucket_rollover() {
        let s = store(100, 1, 100);
        let t = 1_700_000_000_000 - 1_700_000_000_000 % HOUR_MS + 30 * MINUTE_MS;
        assert!(matches!(
            s.check_and_record("c", at(t)),
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            s.check_and_record("c", at(t + 29 * MINUTE_MS)),
            RateDecision::Limited(RateLimitStatus {
                limit_type: LimitType::PerHour,
                ..
            })
        ));
        // Same offset into the next hour bucket is counted from zero.
        assert!(matches!(
            s.check_and_record("c", at(t + HOUR_MS)),
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            s.check_and_record("c", at(t + HOUR_MS + 1)),
            RateDecision::Limited(RateLimitStatus {
                limit_type: LimitType::PerHour,
                ..
            })
        ));
    }

    #[test]
    fn test_unbounded_burst_window_still_limits() {
        let s = RateLimitStore::new(RateLimitConfig {
            per_minute: 100,
            per_hour: 1000,
            burst_limit: 2,
            burst_window_secs: u64::MAX,
        })
        .without_random_sweep();
        let t0 = 1_700_000_000_000;
        s.check_and_record("c", at(t0));
        s.check_and_record("c", at(t0 + 1));
        match s.check_and_record("c", at(t0 + 2)) {
            RateDecision::Limited(status) => {
                assert_eq!(status.limit_type, LimitType::Burst);
                assert_eq!(status.reset_at, DateTime::<Utc>::MAX_UTC);
            }
            other => panic!("expected burst limit, got {:?}", other),
        }
        assert_eq!(s.sweep(at(t0 + HOUR_MS * 24)), 2);
        assert_eq!(s.tracked_windows(), 1);
    }

    #[test]
    fn test_rejected_request_not_counted() {
        let s = store(2, 1000, 100);
        let t = 1_700_000_040_000 - 1_700_000_040_000 % MINUTE_MS;
        s.check_and_record("c", at(t));
        s.check_and_record("c", at(t + 1));
        for _ in 0..5 {
            match s.check_and_record("c", at(t + 2)) {
                RateDecision::Limited(status) => assert_eq!(status.current_count, 2),
                other => panic!("expected limit, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_clients_are_independent() {
        let s = store(1, 1000, 100);
        let now = Utc::now();
        assert!(matches!(
            s.check_and_record("a", now),
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            s.check_and_record("b", now),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_sweep_removes_stale_windows() {
        let s = store(100, 1000, 100);
        let now = Utc::now();
        s.check_and_record("a", now);
        s.check_and_record("b", now);
        assert_eq!(s.tracked_windows(), 6);

        assert_eq!(s.sweep(now), 0);
        let removed = s.sweep(now + Duration::hours(2));
        assert_eq!(removed, 6);
        assert_eq!(s.tracked_windows(), 0);
    }
}
