//! Monitor configuration
//!
//! `IdentityMonitorConfig` is the YAML document operators write
//! (monitored identities, index bounds, output files, notification
//! channels). `MonitorOptions` carries the runtime knobs that come from
//! command-line flags.

use crate::client::RetryPolicy;
use crate::error::{MonitorError, Result};
use crate::store::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default output file for matched identities
pub const DEFAULT_OUTPUT_IDENTITIES_FILE: &str = "identities.txt";

/// Default checkpoint history file
pub const DEFAULT_LOG_INFO_FILE: &str = "logInfo.txt";

/// Default public log
pub const DEFAULT_LOG_URL: &str = "https://rekor.sigstore.dev";

/// Default metrics port
pub const DEFAULT_MONITOR_PORT: u16 = 9464;

/// A certificate subject, optionally restricted to issuers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateIdentity {
    /// Exact certificate subject (SAN email, URI or DNS name)
    pub cert_subject: String,

    /// Accepted OIDC issuers; empty accepts any issuer
    #[serde(default)]
    pub issuers: Vec<String>,
}

/// Extension matcher keyed by an OID given as integer arcs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidExtension {
    pub object_identifier: Vec<u64>,
    #[serde(default)]
    pub extension_values: Vec<String>,
}

/// Extension matcher keyed by a dot-notation OID
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomExtension {
    pub object_identifier: String,
    #[serde(default)]
    pub extension_values: Vec<String>,
}

/// Certificate extension matchers in their three accepted spellings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OidMatchers {
    /// OIDs as integer arrays
    pub oid_extensions: Vec<OidExtension>,

    /// Named Fulcio extensions (e.g. `buildSignerURI`) to accepted values
    pub fulcio_extensions: BTreeMap<String, Vec<String>>,

    /// OIDs in dot notation
    pub custom_extensions: Vec<CustomExtension>,
}

impl OidMatchers {
    /// Whether no matcher is configured
    pub fn is_empty(&self) -> bool {
        self.oid_extensions.is_empty()
            && self.fulcio_extensions.is_empty()
            && self.custom_extensions.is_empty()
    }
}

/// Identities to look for in new log entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoredValues {
    #[serde(rename = "certIdentities")]
    pub certificate_identities: Vec<CertificateIdentity>,

    /// Key fingerprints (hex SHA-256 for keys and certificates, unpadded
    /// base64 SHA-256 for SSH, hex SHA-1 for PGP)
    pub fingerprints: Vec<String>,

    /// Bare subjects outside certificates (e.g. PGP user-ID emails)
    pub subjects: Vec<String>,

    pub oid_matchers: OidMatchers,
}

/// GitHub issue notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubIssueConfig {
    #[serde(default)]
    pub assignee_username: String,
    pub repository_owner: String,
    pub repository_name: String,
    /// Token; falls back to `GITHUB_TOKEN` when empty
    #[serde(default)]
    pub authentication_token: String,
    /// API base URL override (GitHub Enterprise)
    #[serde(default)]
    pub api_base_url: Option<String>,
}

/// SMTP email notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(rename = "recipientEmailAddress")]
    pub recipient_email_address: String,
    #[serde(rename = "senderEmailAddress")]
    pub sender_email_address: String,
    #[serde(rename = "senderSMTPUsername", default)]
    pub sender_smtp_username: String,
    #[serde(rename = "senderSMTPPassword", default)]
    pub sender_smtp_password: String,
    #[serde(rename = "SMTPHostURL")]
    pub smtp_host_url: String,
    #[serde(rename = "SMTPPort", default)]
    pub smtp_port: Option<u16>,
}

/// Mailgun notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailgunConfig {
    #[serde(rename = "recipientEmailAddress")]
    pub recipient_email_address: String,
    #[serde(rename = "senderEmailAddress")]
    pub sender_email_address: String,
    #[serde(rename = "mailgunAPIKey", default)]
    pub mailgun_api_key: String,
    #[serde(rename = "mailgunDomainName", default)]
    pub mailgun_domain_name: String,
    #[serde(rename = "mailgunAPIBaseURL", default)]
    pub api_base_url: Option<String>,
}

/// SendGrid notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendGridConfig {
    #[serde(rename = "recipientName", default)]
    pub recipient_name: String,
    #[serde(rename = "recipientEmailAddress")]
    pub recipient_email_address: String,
    #[serde(rename = "senderName", default)]
    pub sender_name: String,
    #[serde(rename = "senderEmailAddress")]
    pub sender_email_address: String,
    #[serde(rename = "sendGridAPIKey", default)]
    pub sendgrid_api_key: String,
    #[serde(rename = "sendGridAPIBaseURL", default)]
    pub api_base_url: Option<String>,
}

/// Identity monitor YAML document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityMonitorConfig {
    /// First log index to search (inclusive)
    pub start_index: Option<u64>,

    /// Last log index to search (inclusive); pins the run to one cycle
    pub end_index: Option<u64>,

    pub monitored_values: MonitoredValues,

    #[serde(rename = "outputIdentities")]
    pub output_identities_file: Option<PathBuf>,

    pub log_info_file: Option<PathBuf>,

    pub identity_metadata_file: Option<PathBuf>,

    pub github_issue: Option<GitHubIssueConfig>,

    #[serde(rename = "emailNotificationSMTP")]
    pub email_notification_smtp: Option<SmtpConfig>,

    #[serde(rename = "emailNotificationMailgun")]
    pub email_notification_mailgun: Option<MailgunConfig>,

    #[serde(rename = "emailNotificationSendGrid")]
    pub email_notification_sendgrid: Option<SendGridConfig>,
}

impl IdentityMonitorConfig {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| MonitorError::Config(format!("error parsing identities: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!(
                "error reading from identity monitor configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Check index bounds
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_index, self.end_index) {
            if start > end {
                return Err(MonitorError::Config(format!(
                    "startIndex {} is greater than endIndex {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// Output identities file, defaulting to `identities.txt`
    pub fn output_identities_path(&self) -> PathBuf {
        self.output_identities_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_IDENTITIES_FILE))
    }
}

/// Runtime options for the monitoring loop
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Run one cycle and exit
    pub once: bool,
    /// Time between cycles in repeating mode
    pub interval: Duration,
    /// Checkpoint history file
    pub log_info_file: PathBuf,
    /// Checkpoint history bounds
    pub retention: RetentionPolicy,
    /// HTTP retry policy
    pub retry: RetryPolicy,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            once: true,
            interval: Duration::from_secs(5 * 60),
            log_info_file: PathBuf::from(DEFAULT_LOG_INFO_FILE),
            retention: RetentionPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Parse durations such as `500ms`, `30s`, `5m`, `1h` or `1h30m`
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(format!("invalid duration {:?}", input));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {:?}", input))?;
        rest = &rest[digits..];

        let unit_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphabetic())
            .count();
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            unit => return Err(format!("unknown duration unit {:?} in {:?}", unit, input)),
        };
        total += part;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
startIndex: 1000
endIndex: 2000
monitoredValues:
  certIdentities:
    - certSubject: user@domain.com
    - certSubject: otheruser@domain.com
      issuers:
        - https://accounts.example.com
  fingerprints:
    - A0B1C2D3E4F5
  subjects:
    - alice@example.com
  oidMatchers:
    oidExtensions:
      - objectIdentifier: [1, 3, 6, 1, 4, 1, 57264, 1, 9]
        extensionValues: ["https://github.com/org/repo/.github/workflows/release.yml@refs/heads/main"]
    fulcioExtensions:
      buildSignerURI:
        - https://github.com/org/repo/.github/workflows/build.yml@refs/heads/main
    customExtensions:
      - objectIdentifier: 2.5.29.17
        extensionValues: ["san"]
outputIdentities: out/identities.txt
logInfoFile: out/logInfo.txt
identityMetadataFile: out/metadata.json
githubIssue:
  assigneeUsername: octocat
  repositoryOwner: org
  repositoryName: alerts
emailNotificationSMTP:
  recipientEmailAddress: to@example.com
  senderEmailAddress: from@example.com
  senderSMTPUsername: from
  senderSMTPPassword: secret
  SMTPHostURL: smtp.example.com
emailNotificationMailgun:
  recipientEmailAddress: to@example.com
  senderEmailAddress: from@example.com
  mailgunAPIKey: key
  mailgunDomainName: mg.example.com
emailNotificationSendGrid:
  recipientName: Ops
  recipientEmailAddress: to@example.com
  senderName: Monitor
  senderEmailAddress: from@example.com
  sendGridAPIKey: sg-key
"#;

    #[test]
    fn test_parse_full_config() {
        let config = IdentityMonitorConfig::from_yaml(FULL_CONFIG).unwrap();
        assert_eq!(config.start_index, Some(1000));
        assert_eq!(config.end_index, Some(2000));

        let values = &config.monitored_values;
        assert_eq!(values.certificate_identities.len(), 2);
        assert!(values.certificate_identities[0].issuers.is_empty());
        assert_eq!(
            values.certificate_identities[1].issuers,
            vec!["https://accounts.example.com"]
        );
        assert_eq!(values.fingerprints, vec!["A0B1C2D3E4F5"]);
        assert_eq!(values.subjects, vec!["alice@example.com"]);
        assert_eq!(
            values.oid_matchers.oid_extensions[0].object_identifier,
            vec![1, 3, 6, 1, 4, 1, 57264, 1, 9]
        );
        assert!(values.oid_matchers.fulcio_extensions.contains_key("buildSignerURI"));
        assert_eq!(values.oid_matchers.custom_extensions[0].object_identifier, "2.5.29.17");

        assert_eq!(
            config.output_identities_path(),
            PathBuf::from("out/identities.txt")
        );
        assert_eq!(config.log_info_file, Some(PathBuf::from("out/logInfo.txt")));
        assert_eq!(config.github_issue.unwrap().repository_name, "alerts");
        assert_eq!(
            config.email_notification_smtp.unwrap().smtp_host_url,
            "smtp.example.com"
        );
        assert_eq!(
            config.email_notification_mailgun.unwrap().mailgun_domain_name,
            "mg.example.com"
        );
        assert_eq!(
            config.email_notification_sendgrid.unwrap().sendgrid_api_key,
            "sg-key"
        );
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = IdentityMonitorConfig::from_yaml("").unwrap();
        assert!(config.start_index.is_none());
        assert!(config.monitored_values.certificate_identities.is_empty());
        assert_eq!(
            config.output_identities_path(),
            PathBuf::from(DEFAULT_OUTPUT_IDENTITIES_FILE)
        );
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let err = IdentityMonitorConfig::from_yaml("startIndex: [not, a, number]").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn test_start_after_end_rejected() {
        let err = IdentityMonitorConfig::from_yaml("startIndex: 10\nendIndex: 5\n").unwrap_err();
        assert!(err.to_string().contains("greater than"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IdentityMonitorConfig::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("m5").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_monitor_options_defaults() {
        let opts = MonitorOptions::default();
        assert!(opts.once);
        assert_eq!(opts.interval, Duration::from_secs(300));
        assert_eq!(opts.log_info_file, PathBuf::from("logInfo.txt"));
        assert_eq!(opts.retention.max_records, Some(100));
    }
}
