//! Background daemon mode for continuous discovery
//!
//! This module implements a background service that:
//! - Serves the host table to WebSocket subscribers
//! - Runs a discovery cycle at startup and on every interval tick
//! - Handles graceful shutdown via SIGTERM/SIGINT

use anyhow::{Context, Result};
use lanscope_core::config::AgentConfig;
use lanscope_core::publish::ws;
use lanscope_core::scanner::privileges;
use lanscope_core::{DiscoveryEngine, DiscoveryError, Hub};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Longest accepted discovery interval (one week)
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Time between discovery cycles, clamped to 1 minute .. 1 week.
fn discovery_period(interval_minutes: u64) -> Duration {
    let minutes = interval_minutes.clamp(1, MAX_INTERVAL_MINUTES);
    if minutes != interval_minutes {
        tracing::warn!(
            "Discovery interval {} minutes out of range, using {}",
            interval_minutes,
            minutes
        );
    }
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Run the discovery daemon until a shutdown signal arrives
pub async fn run_daemon(config: &AgentConfig, interval_minutes: Option<u64>) -> Result<()> {
    let period = discovery_period(interval_minutes.unwrap_or(config.scan.interval_minutes));

    let caps =
        privileges::detect_capabilities(&config.scan.sweep_program, &config.scan.browse_program)
            .await;
    if let Some(warning) = &caps.warning {
        tracing::warn!("{}", warning);
    }
    let summary = privileges::format_capabilities_message(&caps);
    tracing::info!("{}", summary.lines().next().unwrap_or_default());

    // Set up signal handlers
    let shutdown = Arc::new(Notify::new());
    setup_signal_handlers(shutdown.clone());

    let hub = Arc::new(Hub::new());
    let engine = Arc::new(crate::build_engine(config, hub.clone())?);
    if let Err(e) = engine.restore() {
        tracing::warn!("Could not restore host table: {:#}", e);
    }

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    let mut server = tokio::spawn(ws::serve(listener, hub.clone(), engine.clone()));

    tracing::info!(
        "Starting daemon: discovering every {} minutes, publishing on {}",
        period.as_secs() / 60,
        config.server.listen
    );

    // Run initial discovery immediately
    spawn_cycle(engine.clone());

    // Set up interval timer
    let mut discovery_interval = interval(period);
    discovery_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first tick since we just started a cycle
    discovery_interval.tick().await;

    // Main daemon loop
    loop {
        tokio::select! {
            _ = discovery_interval.tick() => {
                spawn_cycle(engine.clone());
            }
            result = &mut server => {
                match result {
                    Ok(Err(e)) => tracing::error!("Publication server stopped: {:#}", e),
                    Ok(Ok(())) => tracing::error!("Publication server stopped"),
                    Err(e) => tracing::error!("Publication server task failed: {}", e),
                }
                break;
            }
            _ = shutdown.notified() => {
                tracing::info!("Shutdown requested, stopping daemon");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    server.abort();
    tracing::info!(
        "Daemon stopped ({} hosts in table, {} subscribers disconnected)",
        engine.snapshot().len(),
        hub.subscriber_count()
    );
    Ok(())
}

/// Start a discovery cycle in the background unless one is already running.
fn spawn_cycle(engine: Arc<DiscoveryEngine>) {
    tokio::spawn(async move {
        match engine.try_run_cycle().await {
            Ok(report) => {
                tracing::debug!(
                    "Cycle published to {} subscribers ({} hosts)",
                    report.subscribers,
                    report.hosts
                );
            }
            Err(DiscoveryError::CycleInProgress) => {
                tracing::info!("Previous discovery cycle still running, skipping this tick");
            }
            Err(e) if e.is_fatal() => {
                tracing::error!("Discovery failed, published table is stale: {}", e);
            }
            Err(e) => {
                tracing::warn!("Discovery degraded: {}", e);
            }
        }
    });
}

/// Set up SIGTERM and SIGINT handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<Notify>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let shutdown_term = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM");
            shutdown_term.notify_one();
        });

        let shutdown_int = shutdown.clone();
        tokio::spawn(async move {
            let mut sigint =
                signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");
            sigint.recv().await;
            tracing::info!("Received SIGINT");
            shutdown_int.notify_one();
        });
    }

    #[cfg(not(unix))]
    {
        // On non-Unix platforms, rely on tokio::signal::ctrl_c() in the main loop
        let _ = shutdown;
    }
}
