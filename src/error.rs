//! Error types for a3s-tlog-monitor

use crate::checkpoint::CheckpointError;
use thiserror::Error;

/// Errors that can occur while monitoring a transparency log
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Remote log unreachable or request failed in transit
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote log answered with an unexpected status or body
    #[error("Log API error: {0}")]
    Api(String),

    /// Bounded retry window exhausted
    #[error("retry cancelled after {attempts} attempts: {reason}")]
    RetryExhausted { attempts: u32, reason: String },

    /// Checkpoint text could not be decoded
    #[error("Malformed checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Checkpoint signature missing, malformed or invalid
    #[error("Checkpoint signature verification failed: {0}")]
    Signature(String),

    /// Two checkpoints do not describe one append-only history
    #[error("Log consistency verification failed: {0}")]
    Consistency(String),

    /// Previous checkpoint describes an empty log
    #[error("consistency proofs can not be computed starting from an empty log")]
    EmptyLogConsistency,

    /// No range start is known yet
    #[error("no start index set and no log checkpoint")]
    NoStartIndex,

    /// Checkpoint history could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics endpoint could not be served
    #[error("Metrics server error: {0}")]
    Server(String),

    /// Notification delivery failed
    #[error("error sending notification from platform: {0}")]
    Notification(String),

    /// I/O failure outside the checkpoint store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How the monitoring loop reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry on the next tick
    TransientNetwork,
    /// Expected on first runs; never counted as a failure
    Bootstrap,
    /// Possible log misbehaviour; always counted and logged at error level
    TamperEvidence,
    /// Local checkpoint history problem
    Storage,
    /// Rejected at startup
    Configuration,
    /// Alert delivery problem; does not roll back progress
    Notification,
}

impl MonitorError {
    /// Classify this error for the monitoring loop
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connection(_) | Self::Api(_) | Self::RetryExhausted { .. } => {
                ErrorClass::TransientNetwork
            }
            Self::EmptyLogConsistency | Self::NoStartIndex => ErrorClass::Bootstrap,
            Self::Checkpoint(_) | Self::Signature(_) | Self::Consistency(_) => {
                ErrorClass::TamperEvidence
            }
            Self::Storage(_) | Self::Io(_) | Self::Serialization(_) => ErrorClass::Storage,
            Self::Config(_) | Self::Server(_) => ErrorClass::Configuration,
            Self::Notification(_) => ErrorClass::Notification,
        }
    }

    /// Whether this error is part of normal first-run bootstrapping
    pub fn is_bootstrap(&self) -> bool {
        self.class() == ErrorClass::Bootstrap
    }

    /// Whether this error increments the failure counter
    pub fn counts_as_failure(&self) -> bool {
        !self.is_bootstrap()
    }
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
