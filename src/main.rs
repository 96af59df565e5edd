use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use a3s_tlog_monitor::config::{
    parse_duration, DEFAULT_LOG_INFO_FILE, DEFAULT_LOG_URL, DEFAULT_MONITOR_PORT,
};
use a3s_tlog_monitor::server::{shutdown_signal, MetricsServer};
use a3s_tlog_monitor::{
    FileCheckpointStore, IdentityMonitorConfig, LogVerifier, Monitor, MonitorMetrics,
    MonitorOptions, RekorClient, RetentionPolicy, RetryPolicy,
};

/// A3S TLog Monitor - transparency log consistency and identity monitoring
#[derive(Debug, Parser)]
#[command(name = "a3s-tlog-monitor", version, about)]
struct Cli {
    /// Run a single cycle and exit
    #[arg(long, default_value_t = true, num_args = 0..=1, default_missing_value = "true", action = clap::ArgAction::Set)]
    once: bool,

    /// Log server URL
    #[arg(long, default_value = DEFAULT_LOG_URL, env = "TLOG_MONITOR_URL")]
    url: String,

    /// Checkpoint history file (overrides `logInfoFile` in the config)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Time between cycles (e.g. "5m", "1h30m")
    #[arg(long, default_value = "5m", value_parser = parse_duration)]
    interval: Duration,

    /// Identity monitor configuration file (YAML)
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Inline identity monitor configuration (YAML); takes precedence over --config-file
    #[arg(long)]
    config: Option<String>,

    /// Extra text appended to the User-Agent header
    #[arg(long, default_value = "")]
    user_agent: String,

    /// Port for the /metrics endpoint (repeating mode only)
    #[arg(long, default_value_t = DEFAULT_MONITOR_PORT)]
    monitor_port: u16,

    /// Number of checkpoints kept in the history file
    #[arg(long, default_value_t = 100)]
    max_checkpoints: usize,

    /// Drop checkpoints older than this (e.g. "720h")
    #[arg(long, value_parser = parse_duration)]
    max_checkpoint_age: Option<Duration>,

    /// Attempts per HTTP request, including the first
    #[arg(long, default_value_t = 4)]
    max_attempts: u32,

    /// Timeout per HTTP request
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    timeout: Duration,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn identity_config(&self) -> anyhow::Result<IdentityMonitorConfig> {
        if let Some(yaml) = &self.config {
            if self.config_file.is_some() {
                tracing::warn!("Both --config and --config-file given; using --config");
            }
            return Ok(IdentityMonitorConfig::from_yaml(yaml)?);
        }
        match &self.config_file {
            Some(path) => Ok(IdentityMonitorConfig::load(path)?),
            None => Ok(IdentityMonitorConfig::default()),
        }
    }

    fn monitor_options(&self, config: &IdentityMonitorConfig) -> MonitorOptions {
        let log_info_file = self
            .file
            .clone()
            .or_else(|| config.log_info_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_INFO_FILE));

        MonitorOptions {
            once: self.once,
            interval: self.interval,
            log_info_file,
            retention: RetentionPolicy {
                max_records: Some(self.max_checkpoints),
                max_age: self.max_checkpoint_age,
            },
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                ..RetryPolicy::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "a3s_tlog_monitor=debug"
    } else {
        "a3s_tlog_monitor=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.identity_config()?;
    let options = cli.monitor_options(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    tokio::spawn(shutdown_signal(shutdown_tx.clone()));

    let metrics = Arc::new(MonitorMetrics::new());
    let server = if options.once {
        None
    } else {
        Some(
            MetricsServer::start(cli.monitor_port, metrics.clone(), shutdown_rx.clone())
                .await
                .context("Failed to start metrics server")?,
        )
    };

    let client = Arc::new(RekorClient::new(
        &cli.url,
        &cli.user_agent,
        cli.timeout,
        options.retry.clone(),
    )?);
    let verifier = LogVerifier::fetch(client.as_ref())
        .await
        .with_context(|| format!("Failed to fetch public key from {}", cli.url))?;

    let store = Arc::new(FileCheckpointStore::new(options.log_info_file.clone()));
    let mut monitor = Monitor::new(client, verifier, store, metrics, options, config)?;

    let result = monitor.run(shutdown_rx).await;

    shutdown_tx.send_replace(true);
    if let Some(server) = server {
        server.join().await?;
    }

    result?;
    Ok(())
}
