//! Identity matching over newly committed log entries
//!
//! `IdentityMatcher` is compiled once from the configured
//! `MonitoredValues` and then applied to every entry in a searched
//! range. Matches accumulate per configured identity label.

pub mod extensions;
pub mod material;

pub use extensions::{render_oid_matchers, ExtensionMatcher, FULCIO_EXTENSIONS};
pub use material::{CertificateMaterial, EntryMaterial, KeyMaterial};

use crate::client::{LogClient, ENTRY_BATCH_SIZE};
use crate::config::{CertificateIdentity, MonitoredValues};
use crate::error::{MonitorError, Result};
use crate::types::{
    now_millis, FoundIdentityRecord, IdentityMetadata, LogEntry, LogEntryRange,
    MonitoredIdentity,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Compiled identity rules
#[derive(Debug, Clone, Default)]
pub struct IdentityMatcher {
    certificate_identities: Vec<CertificateIdentity>,
    fingerprints: Vec<String>,
    subjects: Vec<String>,
    extension_matchers: Vec<ExtensionMatcher>,
}

impl IdentityMatcher {
    /// Compile monitored values, failing fast on malformed OID matchers
    pub fn compile(values: &MonitoredValues) -> Result<Self> {
        Ok(Self {
            certificate_identities: values.certificate_identities.clone(),
            fingerprints: values
                .fingerprints
                .iter()
                .map(|fp| normalize_fingerprint(fp))
                .collect(),
            subjects: values.subjects.clone(),
            extension_matchers: render_oid_matchers(&values.oid_matchers)?,
        })
    }

    /// Whether any rule is configured
    pub fn is_empty(&self) -> bool {
        self.certificate_identities.is_empty()
            && self.fingerprints.is_empty()
            && self.subjects.is_empty()
            && self.extension_matchers.is_empty()
    }

    /// Log every configured rule at startup
    pub fn log_rules(&self) {
        for id in &self.certificate_identities {
            if id.issuers.is_empty() {
                tracing::info!(subject = %id.cert_subject, "Monitoring certificate subject");
            } else {
                tracing::info!(
                    subject = %id.cert_subject,
                    issuers = %id.issuers.join(","),
                    "Monitoring certificate subject for issuer(s)"
                );
            }
        }
        for fp in &self.fingerprints {
            tracing::info!(fingerprint = %fp, "Monitoring fingerprint");
        }
        for subject in &self.subjects {
            tracing::info!(subject = %subject, "Monitoring subject");
        }
        for m in &self.extension_matchers {
            tracing::info!(oid = %m.oid, values = ?m.values, "Monitoring certificate extension");
        }
    }

    /// `(identity label, matched subject)` pairs for one entry
    pub fn match_entry(&self, entry: &EntryMaterial) -> Vec<(String, String)> {
        let mut hits: Vec<(String, String)> = Vec::new();
        let mut hit = |label: &str, subject: &str| {
            let pair = (label.to_string(), subject.to_string());
            if !hits.contains(&pair) {
                hits.push(pair);
            }
        };

        for cert in &entry.certificates {
            let primary = cert.subjects.first().map(String::as_str).unwrap_or("");

            for id in &self.certificate_identities {
                let issuer_ok = id.issuers.is_empty()
                    || cert
                        .issuer
                        .as_ref()
                        .is_some_and(|issuer| id.issuers.contains(issuer));
                if issuer_ok && cert.subjects.iter().any(|s| *s == id.cert_subject) {
                    hit(&id.cert_subject, &id.cert_subject);
                }
            }

            if self.fingerprints.contains(&cert.fingerprint) {
                hit(&cert.fingerprint, primary);
            }

            for (oid, value) in &cert.extensions {
                if self.extension_matchers.iter().any(|m| m.matches(oid, value)) {
                    hit(value, primary);
                }
            }
        }

        for key in &entry.keys {
            for fp in &key.fingerprints {
                if self.fingerprints.contains(fp) {
                    hit(fp, key.subjects.first().unwrap_or(fp));
                }
            }
            for subject in &key.subjects {
                if self.subjects.contains(subject) {
                    hit(subject, subject);
                }
            }
        }

        hits
    }

    /// Search every entry in `range` and group matches by identity
    ///
    /// Identities with no match are omitted.
    pub async fn search(
        &self,
        range: LogEntryRange,
        client: &dyn LogClient,
    ) -> Result<Vec<MonitoredIdentity>> {
        let mut found: BTreeMap<String, Vec<LogEntry>> = BTreeMap::new();
        let mut scanned = 0u64;

        let mut next = range.start;
        while next <= range.end {
            let batch_end = range
                .end
                .min(next.saturating_add(ENTRY_BATCH_SIZE as u64 - 1));
            let indices: Vec<u64> = (next..=batch_end).collect();

            for raw in client.entries_by_index(&indices).await? {
                scanned += 1;
                let material = match EntryMaterial::extract(&raw) {
                    Ok(material) => material,
                    Err(e) => {
                        tracing::warn!(uuid = %raw.uuid, index = raw.log_index, error = %e, "Skipping undecodable entry");
                        continue;
                    }
                };
                for (label, subject) in self.match_entry(&material) {
                    found.entry(label).or_default().push(LogEntry {
                        cert_subject: subject,
                        uuid: material.uuid.clone(),
                        index: material.index,
                    });
                }
            }

            if batch_end == u64::MAX {
                break;
            }
            next = batch_end + 1;
        }

        let identities: Vec<MonitoredIdentity> = found
            .into_iter()
            .map(|(identity, mut entries)| {
                entries.sort_by_key(|e| e.index);
                MonitoredIdentity {
                    identity,
                    found_identity_entries: entries,
                }
            })
            .collect();

        tracing::info!(
            range = %range,
            scanned,
            identities = identities.len(),
            "Identity search complete"
        );
        Ok(identities)
    }
}

fn normalize_fingerprint(fp: &str) -> String {
    let fp = fp.trim();
    let fp = fp.strip_prefix("SHA256:").unwrap_or(fp);
    if fp.bytes().all(|b| b.is_ascii_hexdigit()) {
        fp.to_ascii_lowercase()
    } else {
        fp.to_string()
    }
}

/// Append one JSON line per found entry to the output identities file
pub fn write_identities(path: &Path, identities: &[MonitoredIdentity]) -> Result<()> {
    if identities.is_empty() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            MonitorError::Storage(format!(
                "Failed to open identities file {}: {}",
                path.display(),
                e
            ))
        })?;

    let found_at = now_millis();
    let mut lines = String::new();
    for identity in identities {
        for entry in &identity.found_identity_entries {
            let record = FoundIdentityRecord {
                identity: identity.identity.clone(),
                cert_subject: entry.cert_subject.clone(),
                uuid: entry.uuid.clone(),
                index: entry.index,
                found_at,
            };
            lines.push_str(&serde_json::to_string(&record)?);
            lines.push('\n');
        }
    }
    file.write_all(lines.as_bytes())?;

    tracing::debug!(path = %path.display(), identities = identities.len(), "Identities written");
    Ok(())
}

/// Atomically record the last searched index
pub fn write_identity_metadata(path: &Path, metadata: &IdentityMetadata) -> Result<()> {
    let json = serde_json::to_string(metadata)?;
    let tmp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(&tmp_path, json).map_err(|e| {
        MonitorError::Storage(format!(
            "Failed to write identity metadata {}: {}",
            tmp_path.display(),
            e
        ))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        MonitorError::Storage(format!(
            "Failed to rename identity metadata {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })?;
    Ok(())
}
