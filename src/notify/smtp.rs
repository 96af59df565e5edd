//! SMTP email notifications

use super::{notification_body, notification_subject, NotificationPlatform};
use crate::config::SmtpConfig;
use crate::error::{MonitorError, Result};
use crate::types::MonitoredIdentity;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Sends alerts through an SMTP relay (STARTTLS/TLS)
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn message(&self, identities: &[MonitoredIdentity]) -> Result<Message> {
        let from: Mailbox = self.config.sender_email_address.parse().map_err(|e| {
            MonitorError::Notification(format!("smtp: invalid sender address: {}", e))
        })?;
        let to: Mailbox = self.config.recipient_email_address.parse().map_err(|e| {
            MonitorError::Notification(format!("smtp: invalid recipient address: {}", e))
        })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(notification_subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notification_body(identities)?)
            .map_err(|e| MonitorError::Notification(format!("smtp: {}", e)))
    }
}

#[async_trait]
impl NotificationPlatform for SmtpNotifier {
    async fn send(&self, identities: &[MonitoredIdentity]) -> Result<()> {
        let message = self.message(identities)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host_url)
            .map_err(|e| MonitorError::Notification(format!("smtp: {}", e)))?;
        if let Some(port) = self.config.smtp_port {
            builder = builder.port(port);
        }
        if !self.config.sender_smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.sender_smtp_username.clone(),
                self.config.sender_smtp_password.clone(),
            ));
        }

        builder
            .build()
            .send(message)
            .await
            .map_err(|e| MonitorError::Notification(format!("smtp: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_build() {
        let notifier = SmtpNotifier::new(SmtpConfig {
            recipient_email_address: "ops@example.com".to_string(),
            sender_email_address: "monitor@example.com".to_string(),
            smtp_host_url: "smtp.example.com".to_string(),
            ..Default::default()
        });
        let message = notifier.message(&[]).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("Subject: a3s-tlog-monitor workflow results"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let notifier = SmtpNotifier::new(SmtpConfig {
            recipient_email_address: "not an address".to_string(),
            sender_email_address: "monitor@example.com".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            notifier.message(&[]),
            Err(MonitorError::Notification(_))
        ));
    }
}
