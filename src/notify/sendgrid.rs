//! SendGrid email notifications

use super::{check_response, http_client, notification_body, notification_subject, NotificationPlatform};
use crate::config::SendGridConfig;
use crate::error::{MonitorError, Result};
use crate::types::MonitoredIdentity;
use async_trait::async_trait;

const DEFAULT_API_BASE_URL: &str = "https://api.sendgrid.com";

/// Sends alerts through the SendGrid v3 mail API
pub struct SendGridNotifier {
    config: SendGridConfig,
    http: reqwest::Client,
}

impl SendGridNotifier {
    pub fn new(config: SendGridConfig) -> Result<Self> {
        Ok(Self {
            config,
            http: http_client()?,
        })
    }

    fn payload(&self, subject: &str, body: &str) -> serde_json::Value {
        serde_json::json!({
            "personalizations": [{
                "to": [{
                    "email": self.config.recipient_email_address,
                    "name": self.config.recipient_name,
                }]
            }],
            "from": {
                "email": self.config.sender_email_address,
                "name": self.config.sender_name,
            },
            "subject": subject,
            "content": [{"type": "text/plain", "value": body}],
        })
    }
}

#[async_trait]
impl NotificationPlatform for SendGridNotifier {
    async fn send(&self, identities: &[MonitoredIdentity]) -> Result<()> {
        if self.config.sendgrid_api_key.is_empty() {
            return Err(MonitorError::Notification("sendgrid: API key is empty".to_string()));
        }

        let payload = self.payload(&notification_subject(), &notification_body(identities)?);
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');

        let response = self
            .http
            .post(format!("{}/v3/mail/send", base))
            .bearer_auth(&self.config.sendgrid_api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MonitorError::Notification(format!("sendgrid: {}", e)))?;

        check_response("sendgrid", response).await
    }

    fn name(&self) -> &str {
        "sendgrid"
    }
}
