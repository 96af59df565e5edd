//! Monitoring loop
//!
//! One cycle fetches the current checkpoint, verifies its signature,
//! proves it consistent with the last persisted checkpoint, persists and
//! prunes history, then searches the newly committed index range for
//! monitored identities and dispatches alerts.
//!
//! ```text
//! Idle → FetchingLogInfo → VerifyingSignature → VerifyingConsistency
//!      → Persisting → ComputingRange → SearchingIdentities → Notifying → Idle
//! ```
//!
//! `Monitor::run_cycle` performs exactly one cycle and reports a
//! [`CycleOutcome`]; `Monitor::run` drives cycles on a ticker until
//! shutdown, or returns after one cycle in single-shot mode.

use crate::checkpoint::SignedCheckpoint;
use crate::client::{LogClient, LogInfo};
use crate::config::{IdentityMonitorConfig, MonitorOptions};
use crate::error::{ErrorClass, MonitorError, Result};
use crate::identity::{write_identities, write_identity_metadata, IdentityMatcher};
use crate::metrics::MonitorMetrics;
use crate::notify::{create_notification_pool, trigger_notifications, NotificationPlatform};
use crate::server::wait_for_shutdown;
use crate::store::CheckpointStore;
use crate::types::{IdentityMetadata, LogEntryRange, MonitoredIdentity};
use crate::verifier::LogVerifier;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// What a successful cycle observed
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Verified checkpoint of the active shard
    pub checkpoint: SignedCheckpoint,
    /// Size of the previously persisted checkpoint, if any
    pub previous_size: Option<u64>,
    /// Whether checkpoint history was reset because it described an empty log
    pub history_reset: bool,
    /// Index range searched, if one could be formed
    pub range: Option<LogEntryRange>,
    /// Identities found in `range`
    pub identities: Vec<MonitoredIdentity>,
}

/// Result of one monitoring cycle
#[derive(Debug)]
pub enum CycleOutcome {
    Success(CycleReport),
    /// Expected on first runs; the next tick will make progress
    RetryableFailure(MonitorError),
    /// Counted failure; repeating mode still waits for the next tick
    FatalFailure(MonitorError),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error(&self) -> Option<&MonitorError> {
        match self {
            Self::Success(_) => None,
            Self::RetryableFailure(e) | Self::FatalFailure(e) => Some(e),
        }
    }

    pub fn into_result(self) -> Result<CycleReport> {
        match self {
            Self::Success(report) => Ok(report),
            Self::RetryableFailure(e) | Self::FatalFailure(e) => Err(e),
        }
    }
}

/// Verified view of the log after the consistency step
struct ConsistencyState {
    previous: Option<SignedCheckpoint>,
    current: SignedCheckpoint,
    info: LogInfo,
}

/// Transparency log monitor
pub struct Monitor {
    client: Arc<dyn LogClient>,
    verifier: LogVerifier,
    store: Arc<dyn CheckpointStore>,
    matcher: IdentityMatcher,
    notifiers: Vec<Box<dyn NotificationPlatform>>,
    metrics: Arc<MonitorMetrics>,
    options: MonitorOptions,
    config: IdentityMonitorConfig,
    start_index: Option<u64>,
}

impl Monitor {
    /// Build a monitor, compiling identity rules and the notification pool
    pub fn new(
        client: Arc<dyn LogClient>,
        verifier: LogVerifier,
        store: Arc<dyn CheckpointStore>,
        metrics: Arc<MonitorMetrics>,
        options: MonitorOptions,
        config: IdentityMonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        if !options.once && options.interval.is_zero() {
            return Err(MonitorError::Config(
                "interval must be greater than zero".to_string(),
            ));
        }

        let matcher = IdentityMatcher::compile(&config.monitored_values)?;
        let notifiers = create_notification_pool(&config)?;

        Ok(Self {
            client,
            verifier,
            store,
            matcher,
            notifiers,
            metrics,
            options,
            start_index: config.start_index,
            config,
        })
    }

    /// Replace the notification pool
    pub fn with_notifiers(mut self, notifiers: Vec<Box<dyn NotificationPlatform>>) -> Self {
        self.notifiers = notifiers;
        self
    }

    /// First index the next search will cover, once known
    pub fn start_index(&self) -> Option<u64> {
        self.start_index
    }

    pub fn metrics(&self) -> &Arc<MonitorMetrics> {
        &self.metrics
    }

    /// Run a single cycle and record it in the metrics
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.metrics.inc_total();

        match self.cycle().await {
            Ok(report) => {
                tracing::info!(
                    checkpoint = %report.checkpoint,
                    previous_size = ?report.previous_size,
                    range = ?report.range.map(|r| r.to_string()),
                    identities = report.identities.len(),
                    "Monitoring cycle complete"
                );
                CycleOutcome::Success(report)
            }
            Err(e) if !e.counts_as_failure() => {
                tracing::info!("{}", e);
                CycleOutcome::RetryableFailure(e)
            }
            Err(e) => {
                self.metrics.inc_failure();
                match e.class() {
                    ErrorClass::TamperEvidence => {
                        tracing::error!(error = %e, "Log integrity check failed")
                    }
                    ErrorClass::TransientNetwork => {
                        tracing::warn!(error = %e, "Log unreachable; will retry on next tick")
                    }
                    _ => tracing::error!(error = %e, "Monitoring cycle failed"),
                }
                CycleOutcome::FatalFailure(e)
            }
        }
    }

    /// Run cycles until shutdown
    ///
    /// Single-shot mode returns after the first cycle with its error, if
    /// any. A configured `endIndex` stops the run after the first
    /// successful cycle.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.matcher.log_rules();

        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            let outcome = self.run_cycle().await;

            if self.options.once {
                return outcome.into_result().map(|_| ());
            }
            if outcome.is_success() && self.config.end_index.is_some() {
                tracing::info!("Configured end index reached");
                return Ok(());
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(shutdown.clone()) => {
                    tracing::info!("Monitor stopped");
                    return Ok(());
                }
            }
        }
    }

    async fn cycle(&mut self) -> Result<CycleReport> {
        let mut history_reset = false;
        let state = loop {
            match self.check_consistency().await {
                Err(MonitorError::EmptyLogConsistency) if !history_reset => {
                    tracing::info!(
                        "Previous checkpoint describes an empty log; resetting checkpoint history"
                    );
                    self.store.reset()?;
                    history_reset = true;
                }
                other => break other?,
            }
        };

        let start = match self.start_index {
            Some(start) => start,
            None => match &state.previous {
                Some(prev) => state.info.checkpoint_index(prev.tree_size)?,
                None => None,
            }
            .ok_or(MonitorError::NoStartIndex)?,
        };
        self.start_index = Some(start);

        let end = match self.config.end_index {
            Some(end) => Some(end),
            None => state.info.checkpoint_index(state.current.tree_size)?,
        };

        let range = match end {
            Some(end) => {
                let range = LogEntryRange::new(start, end);
                if range.is_none() {
                    tracing::warn!(start, end, "Start index is beyond the log head; nothing to search");
                }
                range
            }
            None => None,
        };

        let mut identities = Vec::new();
        if let Some(range) = range {
            if !self.matcher.is_empty() {
                identities = self.matcher.search(range, self.client.as_ref()).await?;
                write_identities(&self.config.output_identities_path(), &identities)?;
                if let Some(path) = &self.config.identity_metadata_file {
                    write_identity_metadata(
                        path,
                        &IdentityMetadata {
                            latest_index: range.end,
                        },
                    )?;
                }
            }
            self.start_index = Some(range.end);
        }

        if !identities.is_empty() {
            for identity in &identities {
                tracing::info!(
                    identity = %identity.identity,
                    entries = identity.found_identity_entries.len(),
                    "Monitored identity found"
                );
            }
            trigger_notifications(&self.notifiers, &identities).await?;
        }

        Ok(CycleReport {
            previous_size: state.previous.as_ref().map(|p| p.tree_size),
            checkpoint: state.current,
            history_reset,
            range,
            identities,
        })
    }

    async fn check_consistency(&self) -> Result<ConsistencyState> {
        let info = self.client.log_info().await?;
        let current = SignedCheckpoint::parse(&info.signed_tree_head)?;
        self.verifier.verify_signature(&current)?;

        let previous = self.store.read_latest()?;
        if let Some(prev) = &previous {
            self.verifier.verify_signature(prev)?;
            self.verifier
                .verify_consistency(prev, &current, &info.tree_id, self.client.as_ref())
                .await?;
        }

        let changed = previous
            .as_ref()
            .map_or(true, |prev| prev.tree_size != current.tree_size);
        if changed {
            if let Err(e) = self.store.append(&current) {
                tracing::warn!(error = %e, checkpoint = %current, "Failed to persist checkpoint");
            }
        }

        self.store.prune(&self.options.retention)?;

        Ok(ConsistencyState {
            previous,
            current,
            info,
        })
    }
}
