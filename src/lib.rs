//! # a3s-tlog-monitor
//!
//! Continuous auditing of a Rekor-style transparency log.
//!
//! ## Overview
//!
//! `a3s-tlog-monitor` watches an append-only log for two kinds of trouble:
//! a split view or rollback, where two observations of the log do not
//! describe one history, and the appearance of monitored identities
//! (certificate subjects, key fingerprints, extension values) in newly
//! committed entries.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_tlog_monitor::{LogVerifier, SignedCheckpoint};
//!
//! # fn example(public_key_pem: &str, note: &str) -> a3s_tlog_monitor::Result<()> {
//! let verifier = LogVerifier::from_pem(public_key_pem)?;
//! let checkpoint = SignedCheckpoint::parse(note)?;
//! verifier.verify_signature(&checkpoint)?;
//! println!("Verified {}", checkpoint);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **LogClient** trait — narrow interface to the remote log (`RekorClient` over HTTP)
//! - **CheckpointStore** trait — persisted checkpoint history (file or in-memory)
//! - **LogVerifier** — signature and consistency checks
//! - **IdentityMatcher** — compiled identity rules and range search
//! - **NotificationPlatform** trait — GitHub, SMTP, SendGrid and Mailgun alerts
//! - **Monitor** — the cycle state machine tying it all together

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod merkle;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod server;
pub mod store;
pub mod types;
pub mod verifier;

// Re-export core types
pub use checkpoint::{CheckpointError, NoteSignature, SignedCheckpoint};
pub use client::{LogClient, LogInfo, RekorClient, RetryPolicy};
pub use config::{IdentityMonitorConfig, MonitorOptions, MonitoredValues};
pub use error::{ErrorClass, MonitorError, Result};
pub use identity::IdentityMatcher;
pub use metrics::MonitorMetrics;
pub use monitor::{CycleOutcome, CycleReport, Monitor};
pub use notify::NotificationPlatform;
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, RetentionPolicy};
pub use types::{LogEntry, LogEntryRange, MonitoredIdentity};
pub use verifier::{LogPublicKey, LogVerifier};
