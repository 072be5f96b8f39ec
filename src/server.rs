use crate::api;
use crate::config::types::AppConfig;
use crate::context::AppContext;
use crate::metrics::MetricsRegistry;
use crate::relay::registry::spawn_report_task;
use crate::relay::SessionRegistry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How the drain phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every session finished inside the grace period.
    Clean,
    /// Sessions were still live when the grace period ran out.
    Forced,
}

/// Main server orchestrator: bind, install signal handlers, serve until shutdown.
pub async fn run(config: AppConfig) -> Result<ShutdownOutcome> {
    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    let ctx = Arc::new(AppContext::new(config));

    let registry = ctx.registry.clone();
    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        handle_signals(registry, shutdown).await;
    });

    serve(ctx, listener).await
}

/// Run every service on a pre-bound listener until `ctx.shutdown` fires,
/// then drain live sessions for up to `server.shutdown_timeout` seconds.
pub async fn serve(ctx: Arc<AppContext>, listener: TcpListener) -> Result<ShutdownOutcome> {
    let config = ctx.config.clone();
    let shutdown = ctx.shutdown.clone();
    let local_addr = listener.local_addr()?;

    log_startup_warnings(&config);

    let mut http_task = {
        let ctx = ctx.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { api::start_server_on_listener(listener, ctx, shutdown).await })
    };
    info!(
        addr = %local_addr,
        ws_path = %config.server.ws_path,
        ssh_port = config.relay.ssh_port,
        "Relay listening"
    );

    if config.metrics.enabled {
        spawn_metrics_server(&config.metrics.listen, ctx.metrics.clone(), shutdown.clone());
    }

    if config.relay.report_interval > 0 {
        spawn_report_task(
            ctx.registry.clone(),
            Duration::from_secs(config.relay.report_interval),
            shutdown.clone(),
        );
    }

    tokio::select! {
        _ = shutdown.cancelled() => {}
        res = &mut http_task => {
            shutdown.cancel();
            return match res {
                Ok(Ok(())) => Ok(ShutdownOutcome::Clean),
                Ok(Err(e)) => Err(e.context("HTTP server failed")),
                Err(e) => Err(anyhow::anyhow!("HTTP server task failed: {}", e)),
            };
        }
    }

    let shutdown_timeout = config.server.shutdown_timeout;
    info!(timeout = shutdown_timeout, "Initiating graceful shutdown");
    let outcome = drain(&ctx.registry, Duration::from_secs(shutdown_timeout)).await;
    if outcome == ShutdownOutcome::Clean {
        info!("Graceful shutdown complete");
    }
    Ok(outcome)
}

/// Wait for the registry to empty, polling every 250ms.
pub async fn drain(registry: &SessionRegistry, timeout: Duration) -> ShutdownOutcome {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let active = registry.len();
        if active == 0 {
            info!("All sessions drained");
            return ShutdownOutcome::Clean;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(active_sessions = active, "Shutdown timeout reached, forcing exit");
            return ShutdownOutcome::Forced;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

fn log_startup_warnings(config: &AppConfig) {
    if config.relay.accept_any_host_key {
        warn!("accept_any_host_key is on: remote server keys are not verified (development only)");
    }
    if !config.relay.private_key_path.exists() {
        warn!(
            path = %config.relay.private_key_path.display(),
            "Private key file missing, key-auth sessions will fail until it exists"
        );
    }
}

/// Spawn the metrics server task
fn spawn_metrics_server(
    listen_addr: &str,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let listen = listen_addr.to_string();
    tokio::spawn(async move {
        if let Err(e) = api::start_metrics_server(&listen, metrics, shutdown).await {
            error!(error = %e, "Metrics server error");
        }
    })
}

fn log_live_sessions(registry: &SessionRegistry) {
    for id in registry.ids() {
        info!(session_id = %id, "Closing session");
    }
}

#[cfg(unix)]
async fn handle_signals(registry: Arc<SessionRegistry>, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGINT handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
        _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown"),
        _ = shutdown.cancelled() => return,
    }
    log_live_sessions(&registry);
    shutdown.cancel();
}

#[cfg(not(unix))]
async fn handle_signals(registry: Arc<SessionRegistry>, shutdown: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "Failed to install Ctrl-C handler");
                return;
            }
            info!("Ctrl-C received, initiating graceful shutdown");
        }
        _ = shutdown.cancelled() => return,
    }
    log_live_sessions(&registry);
    shutdown.cancel();
}
