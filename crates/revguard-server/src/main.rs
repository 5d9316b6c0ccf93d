//! RevGuard policy validator service

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use revguard_server::{create_router, AppState, ConfigOverrides, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "revguard-server")]
#[command(about = "RevGuard review moderation policy validator", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "revguard.yaml")]
    config: PathBuf,

    /// Listen address
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// YAML rule table merged over the default rules
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Append decisions to this JSONL audit file
    #[arg(long)]
    audit_path: Option<PathBuf>,

    /// Disable the decision audit log
    #[arg(long)]
    no_audit: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen.clone(),
            port: self.port,
            rules_path: self.rules.clone(),
            audit_path: self.audit_path.clone(),
            no_audit: self.no_audit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting RevGuard policy validator");

    let config = ServerConfig::load(&cli.config, &cli.overrides())?;
    info!(
        rules = ?config.rules_path,
        audit_enabled = config.audit.enabled,
        audit_path = ?config.audit.path,
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;

    let state = AppState::from_config(&config)?.with_prometheus(metrics_handle);
    let summary = state.engine.get_policy_summary();
    info!(
        policy_version = %summary.policy_version,
        regions = summary.policies.regional_compliance.len(),
        categories = summary.policies.category_restrictions.len(),
        "Policy engine ready"
    );

    let app = create_router(state.clone(), config.max_body_bytes);

    let addr: SocketAddr = config.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Some(audit) = &state.audit {
        audit.lock().flush()?;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("revguard=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("revguard=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Install the Prometheus recorder and describe the exported metrics
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "revguard_decisions_total",
        "Policy decisions by evaluation kind and decision"
    );
    metrics::describe_histogram!(
        "revguard_evaluation_latency_us",
        metrics::Unit::Microseconds,
        "Policy evaluation latency in microseconds"
    );
    metrics::describe_counter!(
        "revguard_policy_updates_total",
        "Applied rule table updates"
    );
    metrics::describe_counter!("revguard_errors_total", "Errors and rejected requests by reason");

    info!("Metrics exporter initialized");
    Ok(handle)
}
