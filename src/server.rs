//! Metrics HTTP endpoint and process shutdown signals

use crate::error::{MonitorError, Result};
use crate::metrics::{MonitorMetrics, OPENMETRICS_CONTENT_TYPE};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Upper bound on graceful shutdown of the metrics server
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the metrics router
pub fn router(metrics: Arc<MonitorMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<MonitorMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// A running metrics server
pub struct MetricsServer {
    addr: SocketAddr,
    handle: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Bind `0.0.0.0:<port>` and serve until `shutdown` flips to true.
    /// Port 0 picks an ephemeral port.
    pub async fn start(
        port: u16,
        metrics: Arc<MonitorMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| MonitorError::Server(format!("Failed to bind to {bind_addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| MonitorError::Server(e.to_string()))?;

        tracing::info!(%addr, "Metrics server listening");

        let app = router(metrics);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for_shutdown(shutdown))
                .await
                .map_err(|e| MonitorError::Server(format!("Server error: {e}")))
        });

        Ok(Self { addr, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server task after shutdown was signalled.
    /// Gives up after [`SHUTDOWN_TIMEOUT`] and aborts the task.
    pub async fn join(self) -> Result<()> {
        let mut handle = self.handle;
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(MonitorError::Server(format!("Server task failed: {e}"))),
            Err(_) => {
                tracing::warn!("Metrics server did not stop within {:?}", SHUTDOWN_TIMEOUT);
                handle.abort();
                Ok(())
            }
        }
    }
}

/// Resolve once the watch value becomes true or every sender is gone
pub async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Flip `tx` to true on SIGINT or SIGTERM
pub async fn shutdown_signal(tx: Arc<watch::Sender<bool>>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    tx.send_replace(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn get_metrics(addr: SocketAddr) -> String {
        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", addr.port()))
            .await
            .unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_counters() {
        let metrics = Arc::new(MonitorMetrics::new());
        metrics.inc_total();
        metrics.inc_failure();

        let (tx, rx) = watch::channel(false);
        let server = MetricsServer::start(0, metrics.clone(), rx).await.unwrap();

        let response = get_metrics(server.local_addr()).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("application/openmetrics-text"));
        assert!(response.contains("log_index_verification_total 1"));
        assert!(response.contains("log_index_verification_failure_total 1"));

        tx.send(true).unwrap();
        server.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_on_dropped_sender() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_already_set() {
        let (_tx, rx) = watch::channel(true);
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(rx))
            .await
            .unwrap();
    }
}
