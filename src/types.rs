//! Core identity-monitoring types
//!
//! All types use camelCase JSON serialization, matching the output
//! identities file and the identity metadata file.

use serde::{Deserialize, Serialize};

/// One log entry in which a monitored identity was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Subject the match was made on (SAN, key subject or fingerprint)
    pub cert_subject: String,

    /// Entry UUID
    pub uuid: String,

    /// Global log index
    pub index: u64,
}

/// A monitored identity with every entry it was found in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredIdentity {
    /// Configured identity label (subject, fingerprint or extension value)
    pub identity: String,

    /// Matching entries, in log order
    pub found_identity_entries: Vec<LogEntry>,
}

/// Inclusive range of log indices searched in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryRange {
    pub start: u64,
    pub end: u64,
}

impl LogEntryRange {
    /// Create a range, `None` when `start > end`
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of indices covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a range covers at least one index
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate the covered indices
    pub fn indices(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }
}

impl std::fmt::Display for LogEntryRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Progress marker written after each identity search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMetadata {
    /// Last log index searched
    pub latest_index: u64,
}

/// One line of the output identities file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundIdentityRecord {
    pub identity: String,
    pub cert_subject: String,
    pub uuid: String,
    pub index: u64,
    /// Unix timestamp in milliseconds when the match was recorded
    pub found_at: u64,
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        assert!(LogEntryRange::new(5, 4).is_none());
        let range = LogEntryRange::new(3, 3).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range.indices().collect::<Vec<_>>(), vec![3]);
        assert_eq!(range.to_string(), "[3, 3]");
    }

    #[test]
    fn test_monitored_identity_serialization() {
        let identity = MonitoredIdentity {
            identity: "alice@example.com".to_string(),
            found_identity_entries: vec![LogEntry {
                cert_subject: "alice@example.com".to_string(),
                uuid: "24296fb24b8ad77a".to_string(),
                index: 42,
            }],
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["identity"], "alice@example.com");
        assert_eq!(json["foundIdentityEntries"][0]["certSubject"], "alice@example.com");
        assert_eq!(json["foundIdentityEntries"][0]["index"], 42);
    }

    #[test]
    fn test_metadata_serialization() {
        let json = serde_json::to_string(&IdentityMetadata { latest_index: 9 }).unwrap();
        assert_eq!(json, r#"{"latestIndex":9}"#);
    }

    #[test]
    fn test_now_millis_is_recent() {
        assert!(now_millis() > 1_600_000_000_000);
    }
}
