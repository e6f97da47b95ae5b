use clap::Parser;
use fedsig_coordinator::state::CoordinatorState;
use fedsig_coordinator::{routes, CoordinatorConfig};
use std::time::Duration;
use tracing::{error, info};

/// Federated threat-intelligence coordinator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML configuration file (optional; overridden by CFG_* env vars).
    #[arg(long)]
    config: Option<String>,

    /// Override the configured bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the configured bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = CoordinatorConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting federated threat-intelligence coordinator");

    let state = CoordinatorState::new(config.clone())?;
    spawn_maintenance(state.clone());

    let app = routes::build_router(state.clone());
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("coordinator stopped");
    Ok(())
}

/// Periodically sweeps timed-out client sessions and expires stale
/// verified IOCs, mirroring the teacher's background forwarder task.
fn spawn_maintenance(state: std::sync::Arc<CoordinatorState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            if let Err(err) = state.run_maintenance() {
                error!(%err, "maintenance sweep failed");
            }
        }
    });
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(err) => error!(%err, "failed to install ctrl_c handler"),
    }
}
