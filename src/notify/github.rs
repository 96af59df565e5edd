//! GitHub issue notifications

use super::{check_response, http_client, notification_body, notification_subject, NotificationPlatform};
use crate::config::GitHubIssueConfig;
use crate::error::{MonitorError, Result};
use crate::types::MonitoredIdentity;
use async_trait::async_trait;

const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Opens one issue per alert in a configured repository
pub struct GitHubIssueNotifier {
    config: GitHubIssueConfig,
    http: reqwest::Client,
}

impl GitHubIssueNotifier {
    pub fn new(config: GitHubIssueConfig) -> Result<Self> {
        Ok(Self {
            config,
            http: http_client()?,
        })
    }

    fn token(&self) -> Result<String> {
        if !self.config.authentication_token.is_empty() {
            return Ok(self.config.authentication_token.clone());
        }
        std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                MonitorError::Notification(
                    "github: no authentication token configured and GITHUB_TOKEN unset"
                        .to_string(),
                )
            })
    }

    fn issues_url(&self) -> String {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!(
            "{}/repos/{}/{}/issues",
            base, self.config.repository_owner, self.config.repository_name
        )
    }
}

#[async_trait]
impl NotificationPlatform for GitHubIssueNotifier {
    async fn send(&self, identities: &[MonitoredIdentity]) -> Result<()> {
        let token = self.token()?;

        let mut issue = serde_json::json!({
            "title": notification_subject(),
            "body": notification_body(identities)?,
            "labels": ["tlog-monitor"],
        });
        if !self.config.assignee_username.is_empty() {
            issue["assignees"] = serde_json::json!([self.config.assignee_username]);
        }

        let response = self
            .http
            .post(self.issues_url())
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .json(&issue)
            .send()
            .await
            .map_err(|e| MonitorError::Notification(format!("github: {}", e)))?;

        check_response("github", response).await
    }

    fn name(&self) -> &str {
        "github"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issues_url() {
        let notifier = GitHubIssueNotifier::new(GitHubIssueConfig {
            repository_owner: "org".to_string(),
            repository_name: "alerts".to_string(),
            api_base_url: Some("https://ghe.example.com/api/v3/".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            notifier.issues_url(),
            "https://ghe.example.com/api/v3/repos/org/alerts/issues"
        );
    }

    #[test]
    fn test_configured_token_preferred() {
        let notifier = GitHubIssueNotifier::new(GitHubIssueConfig {
            authentication_token: "configured".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(notifier.token().unwrap(), "configured");
    }
}
