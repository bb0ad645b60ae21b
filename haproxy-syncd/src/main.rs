mod actuator;
mod api;
mod config;
mod discovery;
mod health;
mod normalize;
mod reconciler;
mod render;
mod scheduler;

use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use crate::actuator::ProxyActuator;
use crate::config::Config;
use crate::discovery::cloudmap::CloudMapDiscovery;
use crate::health::HealthReporter;
use crate::reconciler::Reconciler;
use crate::render::{Renderer, Secrets};

const DEFAULT_CONFIG_PATH: &str = "/etc/haproxy-syncd/haproxy-syncd.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("haproxy_syncd=info"));
    tracing::subscriber::set_global_default(json_subscriber(filter, std::io::stdout))
        .context("Failed to install tracing subscriber")?;

    tracing::info!("Starting haproxy-syncd");

    // An explicitly given file must exist; the default one is optional
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)?,
        None => Config::default(),
    };

    let settings = config
        .apply_env(|key| std::env::var(key).ok())
        .and_then(Config::validate)
        .map_err(|e| {
            tracing::error!("Invalid configuration: {}", e);
            e
        })?;

    tracing::info!(
        region = %settings.region,
        mode = ?settings.mode,
        refresh_interval_secs = settings.refresh_interval_secs,
        namespaces = settings.namespaces.len(),
        "Loaded configuration"
    );

    // Hashed once for the lifetime of the process
    let secrets = Secrets::new(settings.stats_password.clone(), &settings.metrics_password)?;
    let renderer = Renderer::new(secrets, settings.default_domain.clone());

    let discovery = CloudMapDiscovery::connect(
        &settings.region,
        settings.endpoint.as_deref(),
        settings.call_timeout_secs.map(Duration::from_secs),
    )
    .await;

    // Namespace to domain table is fixed for the process lifetime
    let namespaces = reconciler::resolve_namespaces(&discovery, &settings.namespaces)
        .await
        .context("Failed to resolve namespaces")?;
    tracing::info!(
        namespace_ids = ?namespaces.iter().map(|ns| ns.id.as_str()).collect::<Vec<_>>(),
        "Namespaces found"
    );

    let health = HealthReporter::new();
    let (applied_tx, applied_rx) = watch::channel(None);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn reconciliation loop
    let interval = Duration::from_secs(settings.refresh_interval_secs);
    let loop_cancel = cancel.clone();
    let actuator = ProxyActuator::for_mode(
        settings.mode,
        &settings.config_path,
        settings.reload_command.clone(),
    );
    let reconciler = Reconciler::new(discovery, actuator, renderer, namespaces, health.clone(), applied_tx);
    let loop_handle = tokio::spawn(scheduler::run(reconciler, interval, loop_cancel));

    // Build liveness router
    let app = api::routes::router(api::routes::AppState {
        health,
        applied_rx,
    });

    let listener = tokio::net::TcpListener::bind(&settings.health_listen)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.health_listen))?;

    tracing::info!("Liveness API listening on {}", settings.health_listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(loop_handle, server_handle);

    tracing::info!("Shutdown complete");
    Ok(())
}

/// One JSON object per line.
fn json_subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}
