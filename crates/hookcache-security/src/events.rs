//! Security event log.
//!
//! Events are kept in a bounded in-memory ring buffer (oldest evicted first)
//! and, when a sink is attached, forwarded to durable storage by a background
//! task over a bounded queue. When the queue is full (the sink is stuck or
//! slower than the event rate) the event is kept in memory only and counted
//! as dropped. Sink failures are logged; recording never fails.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{SecurityError, SecurityResult};
use crate::sink::EventSink;
use crate::types::ClientInfo;

/// Default time allowed for one durable write.
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of events waiting for the sink before new ones are dropped.
pub const DEFAULT_SINK_QUEUE: usize = 1024;

const TOP_SOURCES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    ValidationSuccess,
    ValidationFailure,
    RateLimitExceeded,
    SecurityViolation,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationSuccess => "validation_success",
            Self::ValidationFailure => "validation_failure",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::SecurityViolation => "security_violation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Immutable record of one security-relevant outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub user_agent: String,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        severity: Severity,
        client: &ClientInfo,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            event_type,
            severity,
            details,
        }
    }
}

/// Aggregate view over the events currently held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEventSummary {
    pub total: usize,
    pub by_type: BTreeMap<SecurityEventType, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Most frequent source IPs, highest count first.
    pub top_sources: Vec<(String, usize)>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Bounded, append-only security event log.
#[derive(Debug)]
pub struct SecurityEventLog {
    capacity: usize,
    events: Mutex<VecDeque<SecurityEvent>>,
    sink: Option<mpsc::Sender<SecurityEvent>>,
    dropped: AtomicU64,
}

impl SecurityEventLog {
    /// In-memory log keeping the most recent `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            sink: None,
            dropped: AtomicU64::new(0),
        }
    }

    /// Log that also forwards every event to `sink`.
    ///
    /// Spawns the forwarding task on the current tokio runtime. At most
    /// [`DEFAULT_SINK_QUEUE`] events wait for the sink.
    pub fn with_sink(
        capacity: usize,
        sink: Arc<dyn EventSink>,
        write_timeout: Duration,
    ) -> SecurityResult<Self> {
        Self::with_sink_queue(capacity, sink, write_timeout, DEFAULT_SINK_QUEUE)
    }

    /// Like [`with_sink`](Self::with_sink) with an explicit queue bound.
    pub fn with_sink_queue(
        capacity: usize,
        sink: Arc<dyn EventSink>,
        write_timeout: Duration,
        queue_capacity: usize,
    ) -> SecurityResult<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            SecurityError::config(format!("event sink requires a tokio runtime: {}", e))
        })?;
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        handle.spawn(forward_events(rx, sink, write_timeout));

        let mut log = Self::new(capacity);
        log.sink = Some(tx);
        Ok(log)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SecurityEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event.
    pub fn record(&self, event: SecurityEvent) {
        emit_trace(&event);

        if let Some(tx) = &self.sink {
            if let Err(e) = tx.try_send(event.clone()) {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                let cause = match e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "sink closed",
                };
                tracing::warn!(
                    event_id = %event.event_id,
                    cause,
                    dropped,
                    "security event not persisted; kept in memory only"
                );
            }
        }

        let mut events = self.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<SecurityEvent> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events that could not be queued for the sink.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn summary(&self) -> SecurityEventSummary {
        let events = self.lock();
        let mut summary = SecurityEventSummary {
            total: events.len(),
            oldest: events.front().map(|e| e.timestamp),
            newest: events.back().map(|e| e.timestamp),
            ..Default::default()
        };

        let mut sources: HashMap<&str, usize> = HashMap::new();
        for event in events.iter() {
            *summary.by_type.entry(event.event_type).or_default() += 1;
            *summary.by_severity.entry(event.severity).or_default() += 1;
            *sources.entry(event.source_ip.as_str()).or_default() += 1;
        }

        let mut top: Vec<(String, usize)> = sources
            .into_iter()
            .map(|(ip, n)| (ip.to_string(), n))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(TOP_SOURCES);
        summary.top_sources = top;

        summary
    }
}

fn emit_trace(event: &SecurityEvent) {
    let event_type = event.event_type.as_str();
    match event.severity {
        Severity::Low => tracing::debug!(
            event_type,
            client_ip = %event.source_ip,
            details = %event.details,
            "security event"
        ),
        Severity::Medium => tracing::info!(
            event_type,
            client_ip = %event.source_ip,
            details = %event.details,
            "security event"
        ),
        Severity::High | Severity::Critical => tracing::warn!(
            event_type,
            severity = event.severity.as_str(),
            client_ip = %event.source_ip,
            details = %event.details,
            "security event"
        ),
    }
}

async fn forward_events(
    mut rx: mpsc::Receiver<SecurityEvent>,
    sink: Arc<dyn EventSink>,
    write_timeout: Duration,
) {
    while let Some(event) = rx.recv().await {
        match tokio::time::timeout(write_timeout, sink.append(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                sink = sink.name(),
                event_id = %event.event_id,
                error = %e,
                "failed to persist security event"
            ),
            Err(_) => {
                let err = SecurityError::SinkTimeout {
                    after: write_timeout,
                };
                tracing::warn!(
                    sink = sink.name(),
                    event_id = %event.event_id,
                    error = %err,
                    "failed to persist security event"
                );
            }
        }
    }
    tracing::debug!(sink = sink.name(), "security event sink drained");
}
