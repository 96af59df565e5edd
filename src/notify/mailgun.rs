//! Mailgun email notifications

use super::{check_response, http_client, notification_body, notification_subject, NotificationPlatform};
use crate::config::MailgunConfig;
use crate::error::{MonitorError, Result};
use crate::types::MonitoredIdentity;
use async_trait::async_trait;

const DEFAULT_API_BASE_URL: &str = "https://api.mailgun.net";

/// Sends alerts through the Mailgun messages API
pub struct MailgunNotifier {
    config: MailgunConfig,
    http: reqwest::Client,
}

impl MailgunNotifier {
    pub fn new(config: MailgunConfig) -> Result<Self> {
        Ok(Self {
            config,
            http: http_client()?,
        })
    }

    fn messages_url(&self) -> String {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{}/v3/{}/messages", base, self.config.mailgun_domain_name)
    }
}

#[async_trait]
impl NotificationPlatform for MailgunNotifier {
    async fn send(&self, identities: &[MonitoredIdentity]) -> Result<()> {
        if self.config.mailgun_api_key.is_empty() {
            return Err(MonitorError::Notification("mailgun: API key is empty".to_string()));
        }
        if self.config.mailgun_domain_name.is_empty() {
            return Err(MonitorError::Notification("mailgun: domain name is empty".to_string()));
        }

        let subject = notification_subject();
        let body = notification_body(identities)?;
        let form = [
            ("from", self.config.sender_email_address.as_str()),
            ("to", self.config.recipient_email_address.as_str()),
            ("subject", subject.as_str()),
            ("text", body.as_str()),
        ];

        let response = self
            .http
            .post(self.messages_url())
            .basic_auth("api", Some(&self.config.mailgun_api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| MonitorError::Notification(format!("mailgun: {}", e)))?;

        check_response("mailgun", response).await
    }

    fn name(&self) -> &str {
        "mailgun"
    }
}
