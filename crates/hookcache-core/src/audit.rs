//! Best-effort audit trail.
//!
//! Records are handed to a background task over a bounded channel, so
//! submitting never blocks or fails the invalidation that produced it. When
//! the channel is full the record is dropped and counted. The task bounds
//! each sink write with a timeout and logs failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::backend::{bounded, AuditSink};
use crate::error::{CoreError, CoreResult};
use crate::types::{CacheInvalidationResult, CacheWarmingResult};

/// Default number of records waiting for the sink before new ones are dropped.
pub const DEFAULT_AUDIT_QUEUE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Invalidation,
    Warming,
}

/// One audited operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub recorded_at: DateTime<Utc>,
    pub kind: AuditKind,
    pub correlation_id: String,
    /// Invalidation type or warming type.
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub trigger_source: String,
    pub success: bool,
    pub entries: u32,
    pub duration_ms: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl AuditRecord {
    pub fn from_invalidation(trigger_source: &str, result: &CacheInvalidationResult) -> Self {
        Self {
            recorded_at: Utc::now(),
            kind: AuditKind::Invalidation,
            correlation_id: result.correlation_id.clone(),
            operation: result.invalidation_type.as_str().to_string(),
            target: Some(result.lock_key.clone()),
            trigger_source: trigger_source.to_string(),
            success: result.success,
            entries: result.cache_entries_invalidated,
            duration_ms: result.timing.total_ms,
            errors: result.errors.clone(),
            warnings: result.warnings.clone(),
        }
    }

    pub fn from_warming(result: &CacheWarmingResult) -> Self {
        Self {
            recorded_at: Utc::now(),
            kind: AuditKind::Warming,
            correlation_id: result.correlation_id.clone(),
            operation: result.warming_type.as_str().to_string(),
            target: None,
            trigger_source: result.warming_strategy.as_str().to_string(),
            success: result.success,
            entries: result.cache_entries_created,
            duration_ms: result.total_time_ms,
            errors: result.errors.clone(),
            warnings: result.warnings.clone(),
        }
    }
}

/// Handle used by the coordinator and warming engine to submit records.
#[derive(Debug, Clone, Default)]
pub struct AuditTrail {
    tx: Option<mpsc::Sender<AuditRecord>>,
    dropped: Arc<AtomicU64>,
}

impl AuditTrail {
    /// Trail that drops every record.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Trail forwarding to `sink` from a task on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, write_timeout: Duration) -> CoreResult<Self> {
        Self::spawn_with_capacity(sink, write_timeout, DEFAULT_AUDIT_QUEUE)
    }

    pub fn spawn_with_capacity(
        sink: Arc<dyn AuditSink>,
        write_timeout: Duration,
        capacity: usize,
    ) -> CoreResult<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            CoreError::config(format!("audit trail requires a tokio runtime: {}", e))
        })?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        handle.spawn(drain(rx, sink, write_timeout));
        Ok(Self {
            tx: Some(tx),
            dropped: Arc::default(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Records that could not be queued, across all clones of this trail.
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue a record. Never blocks.
    pub fn submit(&self, record: AuditRecord) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(record) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let (cause, record) = match e {
                mpsc::error::TrySendError::Full(r) => ("queue full", r),
                mpsc::error::TrySendError::Closed(r) => ("trail closed", r),
            };
            tracing::warn!(
                correlation_id = %record.correlation_id,
                cause,
                dropped,
                "audit record dropped"
            );
        }
    }
}

async fn drain(
    mut rx: mpsc::Receiver<AuditRecord>,
    sink: Arc<dyn AuditSink>,
    write_timeout: Duration,
) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = bounded("audit append", write_timeout, sink.append(&record)).await {
            tracing::warn!(
                sink = sink.name(),
                correlation_id = %record.correlation_id,
                error = %e,
                "audit write failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::types::{CacheInvalidationRequest, InvalidationType};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<AuditRecord>>);

    #[async_trait]
    impl AuditSink for Recording {
        async fn append(&self, record: &AuditRecord) -> Result<(), CollaboratorError> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn record() -> AuditRecord {
        let req = CacheInvalidationRequest::new(InvalidationType::Specific, "webhook")
            .for_page("strategy-plans");
        let result = CacheInvalidationResult::new(&req, req.lock_key());
        AuditRecord::from_invalidation(&req.trigger_source, &result)
    }

    #[test]
    fn test_disabled_drops_silently() {
        let trail = AuditTrail::disabled();
        assert!(!trail.is_enabled());
        trail.submit(record());
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let sink = Arc::new(Recording::default());
        assert!(AuditTrail::spawn(sink, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_records_reach_sink() {
        let sink = Arc::new(Recording::default());
        let trail = AuditTrail::spawn(sink.clone(), Duration::from_secs(1)).unwrap();
        trail.submit(record());
        trail.submit(record());

        for _ in 0..100 {
            if sink.0.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].operation, "specific");
        assert_eq!(records[0].target.as_deref(), Some("strategy-plans:all"));
    }

    struct Stuck {
        gate: tokio::sync::Semaphore,
        written: Mutex<usize>,
    }

    #[async_trait]
    impl AuditSink for Stuck {
        async fn append(&self, _record: &AuditRecord) -> Result<(), CollaboratorError> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            *self.written.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stuck_sink_drops_overflow() {
        let sink = Arc::new(Stuck {
            gate: tokio::sync::Semaphore::new(0),
            written: Mutex::new(0),
        });
        let trail =
            AuditTrail::spawn_with_capacity(sink.clone(), Duration::from_secs(60), 2).unwrap();
        let clone = trail.clone();

        for _ in 0..100 {
            trail.submit(record());
        }
        clone.submit(record());
        assert_eq!(trail.dropped_records(), 99);
        assert_eq!(clone.dropped_records(), 99);

        sink.gate.add_permits(1000);
        for _ in 0..100 {
            if *sink.written.lock().unwrap() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*sink.written.lock().unwrap(), 2);
    }
}
