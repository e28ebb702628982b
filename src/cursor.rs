use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::platform::{ChatMessage, MessageId};

/// Persisted resumption point for the pipeline.
///
/// On disk this is a flat JSON object: every key is a user id mapped to the
/// last message processed for that user, except `msgId`, which holds the id
/// of the last message processed overall.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    /// Stop point for the next batch scan
    #[serde(rename = "msgId", default, skip_serializing_if = "Option::is_none")]
    pub last_batch_msg_id: Option<MessageId>,
    /// Per-user watermarks. Informational only, never consulted for dedup.
    #[serde(flatten)]
    pub users: BTreeMap<String, MessageId>,
}

impl WatermarkRecord {
    /// Whether `id` is the stop point left by the previous run.
    pub fn is_stop_point(&self, id: &MessageId) -> bool {
        self.last_batch_msg_id.as_ref() == Some(id)
    }

    /// Mark `message` as the latest processed message.
    pub fn advance(&mut self, message: &ChatMessage) {
        self.users.insert(message.user_id.clone(), message.id.clone());
        self.last_batch_msg_id = Some(message.id.clone());
    }
}

#[derive(Debug, Error)]
pub enum CursorReadError {
    #[error("cursor file not found")]
    Missing,
    #[error("failed to read cursor file: {0}")]
    Io(#[source] io::Error),
    #[error("cursor file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// JSON file holding the [`WatermarkRecord`]. Single writer, single process.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, treating a missing or unreadable file as empty state.
    pub async fn load(&self) -> WatermarkRecord {
        match self.try_load().await {
            Ok(record) => record,
            Err(CursorReadError::Missing) => {
                debug!("No cursor at {}, starting fresh", self.path.display());
                WatermarkRecord::default()
            }
            Err(e) => {
                warn!("{} ({}), starting fresh", e, self.path.display());
                WatermarkRecord::default()
            }
        }
    }

    pub async fn try_load(&self) -> Result<WatermarkRecord, CursorReadError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => CursorReadError::Missing,
                _ => CursorReadError::Io(e),
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Atomically replace the stored record, creating the parent directory
    /// on first use.
    pub async fn save(&self, record: &WatermarkRecord) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create cursor directory: {}", dir.display()))?;

        let body =
            serde_json::to_string_pretty(record).context("Failed to serialize watermark record")?;

        let tmp_path = self.tmp_path();
        if let Err(e) = write_synced(&tmp_path, body.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e)
                .with_context(|| format!("Failed to write cursor file: {}", tmp_path.display()));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| {
                format!("Failed to replace cursor file: {}", self.path.display())
            });
        }

        // Persist the rename itself
        if let Ok(dir) = tokio::fs::File::open(dir).await {
            let _ = dir.sync_all().await;
        }

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
