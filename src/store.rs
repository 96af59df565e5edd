//! Checkpoint history persistence
//!
//! History is an append-only sequence of escaped checkpoint records,
//! newest last. The file backend rewrites through a temp file + rename
//! so a crash never leaves a torn record behind.

use crate::checkpoint::SignedCheckpoint;
use crate::error::{MonitorError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retention bounds for checkpoint history
///
/// The latest record is always kept, whatever the bounds say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep at most this many records
    pub max_records: Option<usize>,
    /// Drop records whose `Timestamp:` line is older than this
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records: Some(100),
            max_age: None,
        }
    }
}

impl RetentionPolicy {
    /// Count-only retention
    pub fn keep_last(n: usize) -> Self {
        Self {
            max_records: Some(n),
            max_age: None,
        }
    }

    /// Apply the policy to records (oldest first) as of `now` (unix seconds)
    pub fn retain(&self, records: Vec<String>, now: i64) -> Vec<String> {
        if records.is_empty() {
            return records;
        }

        let skip = match self.max_records {
            Some(max) => records.len().saturating_sub(max.max(1)),
            None => 0,
        };
        let mut kept: Vec<String> = records.into_iter().skip(skip).collect();

        if let Some(max_age) = self.max_age {
            let horizon = now.saturating_sub(max_age.as_secs() as i64);
            let last = kept.len() - 1;
            kept = kept
                .into_iter()
                .enumerate()
                .filter(|(i, record)| {
                    *i == last
                        || SignedCheckpoint::from_record(record)
                            .ok()
                            .and_then(|cp| cp.timestamp())
                            .map_or(true, |ts| ts >= horizon)
                })
                .map(|(_, record)| record)
                .collect();
        }

        kept
    }
}

/// Trait for persisting checkpoint history
pub trait CheckpointStore: Send + Sync {
    /// Most recent checkpoint, or `None` when no history exists yet
    ///
    /// A corrupted final record is an error, never skipped.
    fn read_latest(&self) -> Result<Option<SignedCheckpoint>>;

    /// Append a checkpoint after all existing records
    fn append(&self, checkpoint: &SignedCheckpoint) -> Result<()>;

    /// Drop records outside the retention policy
    fn prune(&self, policy: &RetentionPolicy) -> Result<()>;

    /// Discard all history
    fn reset(&self) -> Result<()>;
}

/// File-backed checkpoint history
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            MonitorError::Storage(format!(
                "Failed to read checkpoint file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn write_records(&self, records: &[String]) -> Result<()> {
        let mut content = String::new();
        for record in records {
            content.push_str(record);
            content.push('\n');
        }

        // Atomic write: write to temp file, then rename
        let tmp_path = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MonitorError::Storage(format!(
                        "Failed to create checkpoint directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        std::fs::write(&tmp_path, content).map_err(|e| {
            MonitorError::Storage(format!(
                "Failed to write checkpoint file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            MonitorError::Storage(format!(
                "Failed to rename checkpoint file {} → {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn read_latest(&self) -> Result<Option<SignedCheckpoint>> {
        let records = self.read_records()?;
        match records.last() {
            Some(record) => Ok(Some(SignedCheckpoint::from_record(record)?)),
            None => Ok(None),
        }
    }

    fn append(&self, checkpoint: &SignedCheckpoint) -> Result<()> {
        let mut records = self.read_records()?;
        records.push(checkpoint.to_record());
        self.write_records(&records)?;

        tracing::debug!(
            path = %self.path.display(),
            tree_size = checkpoint.tree_size,
            "Checkpoint appended"
        );
        Ok(())
    }

    fn prune(&self, policy: &RetentionPolicy) -> Result<()> {
        let records = self.read_records()?;
        let before = records.len();
        let kept = policy.retain(records, chrono::Utc::now().timestamp());

        if kept.len() != before {
            self.write_records(&kept)?;
            tracing::debug!(
                path = %self.path.display(),
                removed = before - kept.len(),
                kept = kept.len(),
                "Checkpoint history pruned"
            );
        }
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                MonitorError::Storage(format!(
                    "Failed to remove checkpoint file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

/// In-memory checkpoint history for testing
#[derive(Default)]
pub struct MemoryCheckpointStore {
    records: std::sync::RwLock<Vec<String>>,
}

impl MemoryCheckpointStore {
    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether no records are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw records, oldest first
    pub fn records(&self) -> Vec<String> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Replace the raw records (used to simulate local tampering)
    pub fn set_records(&self, records: Vec<String>) -> Result<()> {
        let mut guard = self.records.write().map_err(|e| {
            MonitorError::Storage(format!("Failed to acquire checkpoint lock: {}", e))
        })?;
        *guard = records;
        Ok(())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn read_latest(&self) -> Result<Option<SignedCheckpoint>> {
        let records = self.records.read().map_err(|e| {
            MonitorError::Storage(format!("Failed to acquire checkpoint lock: {}", e))
        })?;
        match records.last() {
            Some(record) => Ok(Some(SignedCheckpoint::from_record(record)?)),
            None => Ok(None),
        }
    }

    fn append(&self, checkpoint: &SignedCheckpoint) -> Result<()> {
        let mut records = self.records.write().map_err(|e| {
            MonitorError::Storage(format!("Failed to acquire checkpoint lock: {}", e))
        })?;
        records.push(checkpoint.to_record());
        Ok(())
    }

    fn prune(&self, policy: &RetentionPolicy) -> Result<()> {
        let mut records = self.records.write().map_err(|e| {
            MonitorError::Storage(format!("Failed to acquire checkpoint lock: {}", e))
        })?;
        let current = std::mem::take(&mut *records);
        *records = policy.retain(current, chrono::Utc::now().timestamp());
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.set_records(Vec::new())
    }
}
