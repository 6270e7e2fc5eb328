//! Durable sinks for security events.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::SecurityResult;
use crate::events::SecurityEvent;

/// Durable store for security events. Writes are best-effort: the event log
/// logs and drops failures.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, event: &SecurityEvent) -> SecurityResult<()>;

    fn name(&self) -> &'static str {
        "event-sink"
    }
}

/// Appends events as JSON lines to a file.
#[derive(Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
    // Serializes appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn append(&self, event: &SecurityEvent) -> SecurityResult<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SecurityEventType, Severity};
    use crate::types::ClientInfo;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_jsonl_appends_lines() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlEventSink::new(dir.path().join("audit").join("security.jsonl"));
        let client = ClientInfo::new("1.2.3.4", "curl/8.0");

        for _ in 0..3 {
            let event = SecurityEvent::new(
                SecurityEventType::ValidationFailure,
                Severity::Critical,
                &client,
                serde_json::json!({"reason": "signature header missing"}),
            );
            sink.append(&event).await.unwrap();
        }

        let content = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event_type"], "validation_failure");
        assert_eq!(parsed["severity"], "critical");
        assert_eq!(parsed["source_ip"], "1.2.3.4");
    }
}
