//! Health monitor — background task that reconciles on a fixed interval.

use std::time::Duration;

use flywheel_core::Status;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::reconcile::Reconciler;

/// Periodically runs a reconciliation pass and reports every result to the
/// lifecycle actor.
pub struct HealthMonitor {
    reconciler: Reconciler,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Run until `shutdown` changes or the receiving side goes away.
    ///
    /// The first pass runs immediately so a restarted gateway learns the
    /// real state without waiting a full interval.
    pub async fn run(self, updates: mpsc::Sender<Status>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<Status> = None;

        debug!(interval = ?self.interval, "health monitor starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let resolution = self.reconciler.reconcile().await;
                    if last != Some(resolution.status) {
                        match &resolution.cause {
                            Some(cause) => info!(status = %resolution.status, %cause, "observed status changed"),
                            None => info!(status = %resolution.status, "observed status changed"),
                        }
                        last = Some(resolution.status);
                    }
                    if updates.send(resolution.status).await.is_err() {
                        debug!("status receiver closed, health monitor exiting");
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    debug!("health monitor shutting down");
                    break;
                }
            }
        }
    }
}
