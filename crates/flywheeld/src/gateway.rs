//! Process wiring: config, listener, background tasks, serve, persist.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use flywheel_compute::{AwsController, Fleet, MemoryController, ResourceController};
use flywheel_core::{Config, ControllerKind};
use flywheel_gate::{build_router, Forwarder, GateState};
use flywheel_health::{HealthMonitor, Reconciler};
use flywheel_lifecycle::LifecycleActor;
use flywheel_state::StatusFile;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Pending lifecycle requests before request handlers wait for space.
const PING_QUEUE: usize = 64;

pub struct Options {
    pub listen: String,
    pub config: PathBuf,
    pub status_file: Option<PathBuf>,
    pub setuid: Option<String>,
}

pub async fn run(opts: Options) -> anyhow::Result<()> {
    let config = Config::from_file(&opts.config)
        .with_context(|| format!("failed to load config {}", opts.config.display()))?;
    info!(
        path = %opts.config.display(),
        endpoint = %config.endpoint,
        instances = config.instances.len(),
        idle_timeout = ?config.idle_timeout,
        "configuration loaded"
    );

    let listener = TcpListener::bind(&opts.listen)
        .await
        .with_context(|| format!("failed to bind {}", opts.listen))?;

    if let Some(user) = &opts.setuid {
        let (uid, gid) = crate::privileges::drop_to(user)?;
        info!(%user, uid, gid, "dropped privileges");
    }

    // ── Resource controller ────────────────────────────────────

    let controller: Arc<dyn ResourceController> = match config.controller {
        ControllerKind::Aws => Arc::new(AwsController::from_region(&config.region).await),
        ControllerKind::Memory => {
            warn!("using the in-memory controller, no real resources are managed");
            Arc::new(MemoryController::from_config(&config))
        }
    };
    let fleet = Fleet::new(controller, &config);

    // ── Lifecycle state ────────────────────────────────────────

    let mut actor = LifecycleActor::new(fleet.clone(), config.idle_timeout);
    let status_file = opts.status_file.map(StatusFile::new);
    if let Some(file) = &status_file {
        match file.load() {
            Ok(Some(snapshot)) => actor.restore(snapshot, Utc::now()),
            Ok(None) => debug!(path = %file.path().display(), "no status file yet"),
            Err(e) => warn!(error = %e, "ignoring unreadable status file"),
        }
    }

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (lifecycle, pings) = flywheel_lifecycle::channel(PING_QUEUE);
    let (health_tx, health_rx) = mpsc::channel(1);

    let monitor = HealthMonitor::new(Reconciler::new(fleet), config.healthcheck_interval);
    let monitor_handle = tokio::spawn(monitor.run(health_tx, shutdown_rx.clone()));
    let actor_handle = tokio::spawn(actor.run(pings, health_rx, shutdown_rx));

    // ── Gate ───────────────────────────────────────────────────

    let router = build_router(GateState {
        lifecycle,
        config: Arc::new(config),
        forwarder: Forwarder::default(),
    });

    info!(addr = %listener.local_addr()?, "flywheel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;
    let snapshot = actor_handle.await.context("lifecycle actor panicked")?;

    if let Some(file) = &status_file {
        match file.save(&snapshot) {
            Ok(()) => info!(path = %file.path().display(), status = %snapshot.status, "status saved"),
            Err(e) => error!(error = %e, "failed to save status file"),
        }
    }

    info!("flywheel stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
