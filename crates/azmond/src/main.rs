//! azmond: on-demand Azure Monitor probe exporter.
//!
//! Serves `/probe`: each request discovers resources through Azure Resource
//! Graph, fetches their metrics from the regional metrics batch API and
//! answers in the Prometheus text format.
//!
//! # Usage
//!
//! ```text
//! azmond --listen 0.0.0.0:8080 --access-token "$TOKEN"
//! azmond --config /etc/azmond.toml --subscription 00000000-0000-0000-0000-000000000000
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use azmon_client::{
    Deadline, HttpMetricsFactory, RateLimitRecorder, ResourceGraphClient, StaticToken,
    SubscriptionsClient, Transport,
};
use azmon_probe::ProbeServices;
use clap::Parser;
use tracing::{info, warn};

use crate::config::{FileConfig, LogFormat, Overrides, Settings};

const SUBSCRIPTION_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "azmond", about = "On-demand Azure Monitor probe exporter", version)]
struct Cli {
    /// Address to listen on [default: 0.0.0.0:8080].
    #[arg(long)]
    listen: Option<std::net::SocketAddr>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fallback subscription (repeatable). Skips subscription discovery.
    #[arg(long = "subscription")]
    subscriptions: Vec<String>,

    /// Azure Resource Manager endpoint.
    #[arg(long)]
    management_endpoint: Option<String>,

    /// Metrics endpoint template; `{region}` is substituted.
    #[arg(long)]
    metrics_endpoint_template: Option<String>,

    /// Bearer token for outbound API calls. It is not refreshed; restart
    /// with a new token before it expires (about an hour for ARM tokens).
    #[arg(long, env = "AZURE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen: self.listen,
            subscriptions: self.subscriptions.clone(),
            management_endpoint: self.management_endpoint.clone(),
            metrics_endpoint_template: self.metrics_endpoint_template.clone(),
            access_token: self.access_token.clone(),
            log_format: self.log_format,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,azmond=debug,azmon=debug"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(file, cli.overrides())?;

    init_tracing(settings.log_format);

    run(settings).await
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "azmond starting");

    let recorder = Arc::new(RateLimitRecorder::new());
    let token = match &settings.access_token {
        Some(token) => StaticToken::new(token.clone()),
        None => {
            warn!("no access token configured, requests are sent unauthenticated");
            StaticToken::anonymous()
        }
    };
    let transport = Transport::new(Transport::default_http_client()?, Arc::new(token))
        .with_recorder(recorder.clone());

    // ── Fallback subscriptions ─────────────────────────────────

    let subscriptions = if settings.subscriptions.is_empty() {
        let client = SubscriptionsClient::new(transport.clone(), &settings.management_endpoint)?;
        client
            .list_ids(Deadline::after(SUBSCRIPTION_DISCOVERY_TIMEOUT))
            .await
            .context("discovering subscriptions")?
    } else {
        settings.subscriptions.clone()
    };
    info!(count = subscriptions.len(), ?subscriptions, "subscriptions");

    // ── Probe services ─────────────────────────────────────────

    let inventory = ResourceGraphClient::new(transport.clone(), &settings.management_endpoint)?;
    let metrics = HttpMetricsFactory::new(transport, settings.metrics_endpoint_template.clone());
    let services = Arc::new(ProbeServices::new(
        Arc::new(inventory),
        Arc::new(metrics),
        subscriptions,
    ));

    // ── API server ─────────────────────────────────────────────

    let router = azmon_api::build_router(services, recorder);
    let listener = tokio::net::TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("binding {}", settings.listen))?;
    info!(addr = %settings.listen, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("azmond stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(err = %e, "failed to install Ctrl-C handler");
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
                warn!(err = %e, "failed to install SIGTERM handler");
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
    info!("shutdown signal received");
}
