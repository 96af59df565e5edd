//! Remote log client — the narrow interface to a Rekor-style REST API
//!
//! The monitor only needs four calls: current log state, the log's
//! public key, a consistency proof between two sizes, and entries by
//! index. `RekorClient` implements them over HTTP; tests substitute an
//! in-process fake.

use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod rekor;

pub use rekor::{RekorClient, RetryPolicy};

/// Maximum number of indices per entry-retrieval request
pub const ENTRY_BATCH_SIZE: usize = 10;

/// A shard that no longer accepts entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InactiveShard {
    /// Hex-encoded root hash
    #[serde(default)]
    pub root_hash: String,

    /// Signed checkpoint text of the frozen shard
    #[serde(default)]
    pub signed_tree_head: String,

    #[serde(rename = "treeID", default)]
    pub tree_id: String,

    pub tree_size: u64,
}

/// Current state of the log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogInfo {
    /// Hex-encoded root hash
    pub root_hash: String,

    /// Signed checkpoint text for the active shard
    pub signed_tree_head: String,

    /// Active shard tree ID
    #[serde(rename = "treeID")]
    pub tree_id: String,

    /// Active shard size
    pub tree_size: u64,

    #[serde(default)]
    pub inactive_shards: Vec<InactiveShard>,
}

impl LogInfo {
    /// Leaves committed in shards before the active one
    pub fn inactive_offset(&self) -> Result<u64> {
        self.inactive_shards
            .iter()
            .try_fold(0u64, |total, shard| total.checked_add(shard.tree_size))
            .ok_or_else(|| MonitorError::Api("inactive shard sizes overflow u64".to_string()))
    }

    /// Global index of the last entry in a checkpoint of the active shard
    ///
    /// `None` for an empty shard.
    pub fn checkpoint_index(&self, tree_size: u64) -> Result<Option<u64>> {
        let Some(last) = tree_size.checked_sub(1) else {
            return Ok(None);
        };
        last.checked_add(self.inactive_offset()?)
            .map(Some)
            .ok_or_else(|| {
                MonitorError::Api(format!(
                    "log index of tree size {} overflows u64",
                    tree_size
                ))
            })
    }
}

/// Consistency proof between two tree sizes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyProof {
    /// Hex-encoded root hash of the larger tree
    #[serde(default)]
    pub root_hash: String,

    /// Hex-encoded proof hashes
    #[serde(default)]
    pub hashes: Vec<String>,
}

/// A log entry as returned by the entry-retrieval API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEntry {
    /// Entry UUID (the response map key)
    #[serde(default)]
    pub uuid: String,

    /// Base64-encoded canonical entry body (JSON)
    pub body: String,

    #[serde(default)]
    pub integrated_time: i64,

    #[serde(rename = "logID", default)]
    pub log_id: String,

    /// Global log index
    pub log_index: u64,
}

/// Narrow interface to the remote log
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Fetch the current log state
    async fn log_info(&self) -> Result<LogInfo>;

    /// Fetch the log's public key as PEM
    async fn public_key(&self) -> Result<String>;

    /// Fetch a consistency proof from `first_size` to `last_size` in tree `tree_id`
    async fn consistency_proof(
        &self,
        first_size: u64,
        last_size: u64,
        tree_id: &str,
    ) -> Result<ConsistencyProof>;

    /// Fetch entries by global index
    ///
    /// Callers batch at most [`ENTRY_BATCH_SIZE`] indices per call.
    async fn entries_by_index(&self, indices: &[u64]) -> Result<Vec<RawLogEntry>>;

    /// Client name for logging (e.g., "rekor", "fake")
    fn name(&self) -> &str;
}

/// User-agent string sent with every request
pub fn user_agent(extra: &str) -> String {
    let base = format!(
        "a3s-tlog-monitor/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if extra.is_empty() {
        base
    } else {
        format!("{} {}", base, extra)
    }
}
