//! Notification platform integration tests
//!
//! Points the HTTP-based platforms at a local axum server that records
//! every request, and checks the requests each platform sends.

use a3s_tlog_monitor::config::{GitHubIssueConfig, MailgunConfig, SendGridConfig};
use a3s_tlog_monitor::notify::{
    trigger_notifications, GitHubIssueNotifier, MailgunNotifier, NotificationPlatform,
    SendGridNotifier,
};
use a3s_tlog_monitor::{LogEntry, MonitorError, MonitoredIdentity};
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    authorization: String,
    content_type: String,
    body: String,
}

#[derive(Default)]
struct Capture {
    requests: Mutex<Vec<Captured>>,
    status: Mutex<Option<StatusCode>>,
}

async fn record(
    State(capture): State<Arc<Capture>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    capture.requests.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        authorization: header("authorization"),
        content_type: header("content-type"),
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    capture.status.lock().unwrap().unwrap_or(StatusCode::OK)
}

async fn start_capture() -> (String, Arc<Capture>) {
    let capture = Arc::new(Capture::default());
    let app = Router::new()
        .route("/*path", post(record))
        .with_state(capture.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), capture)
}

fn identities() -> Vec<MonitoredIdentity> {
    vec![MonitoredIdentity {
        identity: "release@example.com".to_string(),
        found_identity_entries: vec![LogEntry {
            cert_subject: "release@example.com".to_string(),
            uuid: "24296fb24b8ad77a".to_string(),
            index: 42,
        }],
    }]
}

// ─── GitHub ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_github_issue_created() {
    let (base, capture) = start_capture().await;
    let notifier = GitHubIssueNotifier::new(GitHubIssueConfig {
        assignee_username: "octocat".to_string(),
        repository_owner: "org".to_string(),
        repository_name: "alerts".to_string(),
        authentication_token: "gh-token".to_string(),
        api_base_url: Some(base),
    })
    .unwrap();

    notifier.send(&identities()).await.unwrap();

    let requests = capture.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/repos/org/alerts/issues");
    assert_eq!(requests[0].authorization, "Bearer gh-token");

    let issue: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert!(issue["title"]
        .as_str()
        .unwrap()
        .starts_with("a3s-tlog-monitor workflow results for"));
    assert!(issue["body"].as_str().unwrap().contains("release@example.com"));
    assert_eq!(issue["assignees"][0], "octocat");
}

#[tokio::test]
async fn test_github_error_status_surfaced() {
    let (base, capture) = start_capture().await;
    *capture.status.lock().unwrap() = Some(StatusCode::UNAUTHORIZED);
    let notifier = GitHubIssueNotifier::new(GitHubIssueConfig {
        repository_owner: "org".to_string(),
        repository_name: "alerts".to_string(),
        authentication_token: "bad".to_string(),
        api_base_url: Some(base),
        ..Default::default()
    })
    .unwrap();

    let err = notifier.send(&identities()).await.unwrap_err();
    assert!(matches!(err, MonitorError::Notification(_)));
    assert!(err.to_string().contains("401"));
}

// ─── SendGrid ────────────────────────────────────────────────────

#[tokio::test]
async fn test_sendgrid_mail_sent() {
    let (base, capture) = start_capture().await;
    let notifier = SendGridNotifier::new(SendGridConfig {
        recipient_name: "Ops".to_string(),
        recipient_email_address: "ops@example.com".to_string(),
        sender_name: "Monitor".to_string(),
        sender_email_address: "monitor@example.com".to_string(),
        sendgrid_api_key: "sg-key".to_string(),
        api_base_url: Some(base),
    })
    .unwrap();

    notifier.send(&identities()).await.unwrap();

    let requests = capture.requests.lock().unwrap().clone();
    assert_eq!(requests[0].path, "/v3/mail/send");
    assert_eq!(requests[0].authorization, "Bearer sg-key");
    let mail: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(mail["personalizations"][0]["to"][0]["email"], "ops@example.com");
}

// ─── Mailgun ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_mailgun_form_posted() {
    let (base, capture) = start_capture().await;
    let notifier = MailgunNotifier::new(MailgunConfig {
        recipient_email_address: "ops@example.com".to_string(),
        sender_email_address: "monitor@example.com".to_string(),
        mailgun_api_key: "mg-key".to_string(),
        mailgun_domain_name: "mg.example.com".to_string(),
        api_base_url: Some(base),
    })
    .unwrap();

    notifier.send(&identities()).await.unwrap();

    let requests = capture.requests.lock().unwrap().clone();
    assert_eq!(requests[0].path, "/v3/mg.example.com/messages");
    assert!(requests[0].authorization.starts_with("Basic "));
    assert!(requests[0]
        .content_type
        .starts_with("application/x-www-form-urlencoded"));
    assert!(requests[0].body.contains("to=ops%40example.com"));
}

#[tokio::test]
async fn test_mailgun_rejects_empty_credentials_without_request() {
    let (base, capture) = start_capture().await;
    let notifier = MailgunNotifier::new(MailgunConfig {
        recipient_email_address: "ops@example.com".to_string(),
        sender_email_address: "monitor@example.com".to_string(),
        api_base_url: Some(base),
        ..Default::default()
    })
    .unwrap();

    assert!(notifier.send(&identities()).await.is_err());
    assert!(capture.requests.lock().unwrap().is_empty());
}

// ─── Dispatch ────────────────────────────────────────────────────

#[tokio::test]
async fn test_dispatch_stops_after_failing_platform() {
    let (base, capture) = start_capture().await;
    let failing = SendGridNotifier::new(SendGridConfig {
        recipient_email_address: "ops@example.com".to_string(),
        sender_email_address: "monitor@example.com".to_string(),
        api_base_url: Some(base.clone()),
        ..Default::default()
    })
    .unwrap();
    let never_reached = MailgunNotifier::new(MailgunConfig {
        recipient_email_address: "ops@example.com".to_string(),
        sender_email_address: "monitor@example.com".to_string(),
        mailgun_api_key: "mg-key".to_string(),
        mailgun_domain_name: "mg.example.com".to_string(),
        api_base_url: Some(base),
    })
    .unwrap();

    let pool: Vec<Box<dyn NotificationPlatform>> =
        vec![Box::new(failing), Box::new(never_reached)];
    let err = trigger_notifications(&pool, &identities()).await.unwrap_err();

    assert!(err
        .to_string()
        .starts_with("error sending notification from platform: sendgrid"));
    assert!(capture.requests.lock().unwrap().is_empty());
}
