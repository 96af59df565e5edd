//! Notification dispatch for matched identities
//!
//! Each channel implements `NotificationPlatform`. The pool is built
//! once from configuration; dispatch walks it in order and stops at the
//! first failure.

use crate::config::IdentityMonitorConfig;
use crate::error::{MonitorError, Result};
use crate::types::MonitoredIdentity;
use async_trait::async_trait;
use std::time::Duration;

pub mod github;
pub mod mailgun;
pub mod sendgrid;
pub mod smtp;

pub use github::GitHubIssueNotifier;
pub use mailgun::MailgunNotifier;
pub use sendgrid::SendGridNotifier;
pub use smtp::SmtpNotifier;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// An outbound alert channel
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    /// Deliver one alert covering all matched identities
    async fn send(&self, identities: &[MonitoredIdentity]) -> Result<()>;

    /// Channel name (e.g., "github", "smtp")
    fn name(&self) -> &str;
}

/// Build the notification pool in a fixed order:
/// GitHub issue, SMTP, SendGrid, Mailgun
pub fn create_notification_pool(
    config: &IdentityMonitorConfig,
) -> Result<Vec<Box<dyn NotificationPlatform>>> {
    let mut pool: Vec<Box<dyn NotificationPlatform>> = Vec::new();

    if let Some(github) = &config.github_issue {
        pool.push(Box::new(GitHubIssueNotifier::new(github.clone())?));
    }
    if let Some(smtp) = &config.email_notification_smtp {
        pool.push(Box::new(SmtpNotifier::new(smtp.clone())));
    }
    if let Some(sendgrid) = &config.email_notification_sendgrid {
        pool.push(Box::new(SendGridNotifier::new(sendgrid.clone())?));
    }
    if let Some(mailgun) = &config.email_notification_mailgun {
        pool.push(Box::new(MailgunNotifier::new(mailgun.clone())?));
    }

    for platform in &pool {
        tracing::debug!(platform = platform.name(), "Notification platform configured");
    }
    Ok(pool)
}

/// Send to every platform in order, stopping at the first failure
pub async fn trigger_notifications(
    platforms: &[Box<dyn NotificationPlatform>],
    identities: &[MonitoredIdentity],
) -> Result<()> {
    for platform in platforms {
        platform.send(identities).await.map_err(|e| match e {
            MonitorError::Notification(_) => e,
            other => MonitorError::Notification(format!("{}: {}", platform.name(), other)),
        })?;
        tracing::info!(
            platform = platform.name(),
            identities = identities.len(),
            "Notification sent"
        );
    }
    Ok(())
}

/// Alert title, stamped with the current time
pub fn notification_subject() -> String {
    format!(
        "a3s-tlog-monitor workflow results for {}",
        chrono::Utc::now().format("%d %b %y %H:%M UTC")
    )
}

/// Plain-text alert body listing every identity and entry
pub fn notification_body(identities: &[MonitoredIdentity]) -> Result<String> {
    let pretty = serde_json::to_string_pretty(identities)?;
    Ok(format!(
        "The transparency log monitor found the following monitored identities and matching log entries:\n\n{}\n",
        pretty
    ))
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(crate::client::user_agent(""))
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| MonitorError::Config(format!("Failed to build HTTP client: {}", e)))
}

pub(crate) async fn check_response(platform: &str, response: reqwest::Response) -> Result<()> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(MonitorError::Notification(format!(
            "{} returned {}: {}",
            platform,
            status,
            body.trim()
        )));
    }
    Ok(())
}
