//! Deferred warming queue.
//!
//! Scheduled warming requests are not executed inline; each target is pushed
//! onto a bounded channel and warmed later by a worker task. Enqueueing never
//! waits: a full or closed queue is reported to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::backend::CacheBackend;
use crate::error::{CoreError, CoreResult};
use crate::types::{WarmStatus, WarmingTarget};
use crate::warming::warm_page;

/// One page of scheduled warming work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledWarm {
    pub correlation_id: String,
    pub target: WarmingTarget,
    /// Resolved widget list.
    pub widget_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeferredWarmingQueue {
    tx: mpsc::Sender<(ScheduledWarm, DateTime<Utc>)>,
}

/// Consumer half, handed to [`spawn_deferred_worker`].
#[derive(Debug)]
pub struct DeferredWarmingReceiver {
    rx: mpsc::Receiver<(ScheduledWarm, DateTime<Utc>)>,
}

impl DeferredWarmingQueue {
    /// Bounded queue holding at most `capacity` pending pages.
    pub fn channel(capacity: usize) -> (Self, DeferredWarmingReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, DeferredWarmingReceiver { rx })
    }

    pub fn enqueue(&self, job: ScheduledWarm) -> CoreResult<()> {
        self.tx
            .try_send((job, Utc::now()))
            .map_err(|e| match e {
                TrySendError::Full(_) => CoreError::QueueUnavailable {
                    message: "queue is full".to_string(),
                },
                TrySendError::Closed(_) => CoreError::QueueUnavailable {
                    message: "worker has stopped".to_string(),
                },
            })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Totals reported by a worker when its queue closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferredWorkerReport {
    pub jobs_processed: u64,
    pub pages_warmed: u64,
    pub entries_created: u64,
    pub failures: u64,
}

/// Warm queued pages one at a time until every queue handle is dropped.
pub fn spawn_deferred_worker(
    receiver: DeferredWarmingReceiver,
    cache: Arc<dyn CacheBackend>,
    call_timeout: Duration,
) -> JoinHandle<DeferredWorkerReport> {
    let mut rx = receiver.rx;
    tokio::spawn(async move {
        let mut report = DeferredWorkerReport::default();
        while let Some((job, enqueued_at)) = rx.recv().await {
            let queued_ms = (Utc::now() - enqueued_at).num_milliseconds().max(0);
            let outcome = warm_page(
                cache.as_ref(),
                &job.target.page_id,
                &job.widget_ids,
                job.target.priority,
                call_timeout,
            )
            .await;

            report.jobs_processed += 1;
            report.entries_created += u64::from(outcome.entries_created);
            if matches!(outcome.status, WarmStatus::Warmed | WarmStatus::PartiallyWarmed) {
                report.pages_warmed += 1;
            }
            if outcome.errors.is_empty() {
                tracing::debug!(
                    correlation_id = %job.correlation_id,
                    page_id = %job.target.page_id,
                    entries = outcome.entries_created,
                    queued_ms,
                    "deferred warm completed"
                );
            } else {
                report.failures += 1;
                tracing::warn!(
                    correlation_id = %job.correlation_id,
                    page_id = %job.target.page_id,
                    errors = ?outcome.errors,
                    "deferred warm failed"
                );
            }
        }
        tracing::info!(
            jobs = report.jobs_processed,
            failures = report.failures,
            "deferred warming worker stopped"
        );
        report
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(page: &str) -> ScheduledWarm {
        ScheduledWarm {
            correlation_id: "c-1".to_string(),
            target: WarmingTarget::page(page, 1),
            widget_ids: vec!["default".to_string()],
        }
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let (queue, _rx) = DeferredWarmingQueue::channel(1);
        queue.enqueue(job("a")).unwrap();
        assert_eq!(queue.available(), 0);
        let err = queue.enqueue(job("b")).unwrap_err();
        assert!(err.to_string().contains("full"));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let (queue, rx) = DeferredWarmingQueue::channel(4);
        drop(rx);
        assert!(matches!(
            queue.enqueue(job("a")),
            Err(CoreError::QueueUnavailable { .. })
        ));
    }
}
