use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::orchestrator::RunRecord;

/// Best-effort destination for terminal run records.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, record: RunRecord);
}

/// Discards every record.
pub struct NullHistorySink;

#[async_trait]
impl HistorySink for NullHistorySink {
    async fn record(&self, _record: RunRecord) {}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryLine<'a> {
    recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    record: &'a RunRecord,
}

/// Appends one JSON line per record.
pub struct JsonlHistorySink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlHistorySink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, record: &RunRecord) -> std::io::Result<()> {
        let line = HistoryLine {
            recorded_at: Utc::now(),
            record,
        };
        let mut serialized = serde_json::to_vec(&line)?;
        serialized.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&serialized).await?;
        file.flush().await
    }
}

#[async_trait]
impl HistorySink for JsonlHistorySink {
    async fn record(&self, record: RunRecord) {
        if let Err(e) = self.append(&record).await {
            log::warn!("failed to write history to {}: {}", self.path.display(), e);
        }
    }
}
