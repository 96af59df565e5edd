//! Certificate extension matchers
//!
//! Operators name extensions three ways: integer OID arcs, dot-notation
//! strings, or Fulcio's named extensions. All three compile to one list
//! of `(dot-notation OID, accepted values)`.

use crate::config::OidMatchers;
use crate::error::{MonitorError, Result};

/// Fulcio certificate extensions by configuration name
///
/// `issuer` covers both the deprecated raw-string OID and its
/// DER-encoded successor.
pub const FULCIO_EXTENSIONS: &[(&str, &[&str])] = &[
    ("issuer", &["1.3.6.1.4.1.57264.1.1", "1.3.6.1.4.1.57264.1.8"]),
    ("githubWorkflowTrigger", &["1.3.6.1.4.1.57264.1.2"]),
    ("githubWorkflowSHA", &["1.3.6.1.4.1.57264.1.3"]),
    ("githubWorkflowName", &["1.3.6.1.4.1.57264.1.4"]),
    ("githubWorkflowRepository", &["1.3.6.1.4.1.57264.1.5"]),
    ("githubWorkflowRef", &["1.3.6.1.4.1.57264.1.6"]),
    ("buildSignerURI", &["1.3.6.1.4.1.57264.1.9"]),
    ("buildSignerDigest", &["1.3.6.1.4.1.57264.1.10"]),
    ("runnerEnvironment", &["1.3.6.1.4.1.57264.1.11"]),
    ("sourceRepositoryURI", &["1.3.6.1.4.1.57264.1.12"]),
    ("sourceRepositoryDigest", &["1.3.6.1.4.1.57264.1.13"]),
    ("sourceRepositoryRef", &["1.3.6.1.4.1.57264.1.14"]),
    ("sourceRepositoryIdentifier", &["1.3.6.1.4.1.57264.1.15"]),
    ("sourceRepositoryOwnerURI", &["1.3.6.1.4.1.57264.1.16"]),
    ("sourceRepositoryOwnerIdentifier", &["1.3.6.1.4.1.57264.1.17"]),
    ("buildConfigURI", &["1.3.6.1.4.1.57264.1.18"]),
    ("buildConfigDigest", &["1.3.6.1.4.1.57264.1.19"]),
    ("buildTrigger", &["1.3.6.1.4.1.57264.1.20"]),
    ("runInvocationURI", &["1.3.6.1.4.1.57264.1.21"]),
    ("sourceRepositoryVisibilityAtSigning", &["1.3.6.1.4.1.57264.1.22"]),
];

/// Fulcio issuer OID (DER UTF8String value)
pub const OID_FULCIO_ISSUER_V2: &str = "1.3.6.1.4.1.57264.1.8";

/// Deprecated Fulcio issuer OID (raw string value)
pub const OID_FULCIO_ISSUER_V1: &str = "1.3.6.1.4.1.57264.1.1";

/// One compiled extension matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMatcher {
    /// OID in dot notation
    pub oid: String,
    /// Accepted extension values
    pub values: Vec<String>,
}

impl ExtensionMatcher {
    /// Whether `value` of extension `oid` satisfies this matcher
    pub fn matches(&self, oid: &str, value: &str) -> bool {
        self.oid == oid && self.values.iter().any(|v| v == value)
    }
}

/// Flatten all three matcher spellings into one list
pub fn render_oid_matchers(matchers: &OidMatchers) -> Result<Vec<ExtensionMatcher>> {
    let mut rendered = Vec::new();

    for ext in &matchers.oid_extensions {
        let oid = oid_from_arcs(&ext.object_identifier)?;
        rendered.push(ExtensionMatcher {
            oid,
            values: ext.extension_values.clone(),
        });
    }

    for (name, values) in &matchers.fulcio_extensions {
        let oids = FULCIO_EXTENSIONS
            .iter()
            .find(|(known, _)| *known == name.as_str())
            .map(|(_, oids)| *oids)
            .ok_or_else(|| {
                MonitorError::Config(format!("unsupported named extension {:?}", name))
            })?;
        for oid in oids {
            rendered.push(ExtensionMatcher {
                oid: oid.to_string(),
                values: values.clone(),
            });
        }
    }

    for ext in &matchers.custom_extensions {
        let oid = parse_dot_notation(&ext.object_identifier)?;
        rendered.push(ExtensionMatcher {
            oid,
            values: ext.extension_values.clone(),
        });
    }

    Ok(rendered)
}

fn oid_from_arcs(arcs: &[u64]) -> Result<String> {
    if arcs.is_empty() {
        return Err(MonitorError::Config(
            "could not parse object identifier: empty input".to_string(),
        ));
    }
    validate_arcs(arcs)?;
    Ok(arcs
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("."))
}

/// Parse and canonicalise a dot-notation OID
pub fn parse_dot_notation(oid: &str) -> Result<String> {
    let arcs = oid
        .trim()
        .split('.')
        .map(|arc| {
            if arc.is_empty() || !arc.bytes().all(|b| b.is_ascii_digit()) {
                return Err(MonitorError::Config(format!(
                    "could not parse object identifier {:?}",
                    oid
                )));
            }
            arc.parse::<u64>().map_err(|_| {
                MonitorError::Config(format!("could not parse object identifier {:?}", oid))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    oid_from_arcs(&arcs)
}

fn validate_arcs(arcs: &[u64]) -> Result<()> {
    if arcs.len() < 2 {
        return Err(MonitorError::Config(format!(
            "object identifier {:?} needs at least two arcs",
            arcs
        )));
    }
    if arcs[0] > 2 || (arcs[0] < 2 && arcs[1] > 39) {
        return Err(MonitorError::Config(format!(
            "object identifier {:?} has invalid leading arcs",
            arcs
        )));
    }
    Ok(())
}
