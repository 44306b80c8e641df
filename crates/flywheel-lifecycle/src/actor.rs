//! Lifecycle actor — arbitrates pings, ticks and health updates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use flywheel_compute::Fleet;
use flywheel_core::{LifecycleSnapshot, Status};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::idle::IdleTimer;
use crate::ping::{Ping, PingKind, Pong};

/// How often the idle deadline is evaluated.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct LifecycleActor {
    fleet: Fleet,
    status: Status,
    last_started: Option<DateTime<Utc>>,
    last_stopped: Option<DateTime<Utc>>,
    idle: IdleTimer,
    tick: Duration,
}

impl LifecycleActor {
    pub fn new(fleet: Fleet, idle_timeout: Duration) -> Self {
        Self {
            fleet,
            status: Status::Stopped,
            last_started: None,
            last_stopped: None,
            idle: IdleTimer::new(idle_timeout, Utc::now()),
            tick: TICK_INTERVAL,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Adopt a snapshot from a previous run.
    ///
    /// An elapsed deadline on a started snapshot is pushed out by a full
    /// idle timeout so the backend is not stopped on the first tick.
    pub fn restore(&mut self, snapshot: LifecycleSnapshot, now: DateTime<Utc>) {
        self.status = snapshot.status;
        self.last_started = snapshot.last_started;
        self.last_stopped = snapshot.last_stopped;
        self.idle.set_stop_at(snapshot.stop_at);
        if self.status == Status::Started && self.idle.refresh_if_elapsed(now) {
            debug!(stop_at = %self.idle.stop_at(), "restored deadline had elapsed, renewed");
        }
        info!(status = %self.status, "lifecycle state restored");
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            status: self.status,
            error: None,
            last_started: self.last_started,
            last_stopped: self.last_stopped,
            stop_at: self.idle.stop_at(),
        }
    }

    /// Process one request and build its reply.
    pub async fn handle_ping(&mut self, kind: PingKind, now: DateTime<Utc>) -> Pong {
        let mut failure = None;

        match (self.status, kind) {
            (_, PingKind::Status) => {}
            (Status::Stopped, PingKind::Start) => {
                info!("startup requested");
                match self.fleet.start().await {
                    Ok(()) => {
                        self.status = Status::Starting;
                        self.last_started = Some(now);
                        self.idle.renew(now);
                    }
                    Err(e) => {
                        error!(error = %e, "failed to start resources");
                        failure = Some(e.to_string());
                    }
                }
            }
            (Status::Started, PingKind::Stop) => {
                info!("shutdown requested");
                match self.fleet.stop().await {
                    Ok(()) => {
                        self.status = Status::Stopping;
                        self.last_stopped = Some(now);
                    }
                    Err(e) => {
                        error!(error = %e, "failed to stop resources");
                        failure = Some(e.to_string());
                    }
                }
            }
            (Status::Started, PingKind::StopIn(duration)) => {
                let stop_at = self.idle.stop_in(now, duration);
                info!(%stop_at, "idle deadline overridden");
            }
            (Status::Started, PingKind::Touch | PingKind::Start) => {
                let stop_at = self.idle.renew(now);
                debug!(%stop_at, "idle deadline renewed");
            }
            _ => {}
        }

        let pong = self.snapshot();
        match failure {
            Some(e) => pong.with_error(e),
            None => pong,
        }
    }

    /// Enforce the idle deadline.
    ///
    /// The stop is best-effort: the status moves to `Stopping` even when the
    /// command fails, and the health monitor reports what actually happened.
    pub async fn on_tick(&mut self, now: DateTime<Utc>) {
        if self.status != Status::Started || !self.idle.expired(now) {
            return;
        }

        info!(stop_at = %self.idle.stop_at(), "idle timeout reached, shutting down");
        if let Err(e) = self.fleet.stop().await {
            error!(error = %e, "idle shutdown failed");
        }
        self.status = Status::Stopping;
        self.last_stopped = Some(now);
    }

    /// Adopt a status reported by the health monitor.
    pub fn on_health(&mut self, reported: Status, now: DateTime<Utc>) {
        if reported == self.status {
            return;
        }

        let previous = self.status;
        self.status = reported;
        info!(from = %previous, to = %reported, "health check changed status");

        if reported == Status::Started {
            if previous == Status::Starting {
                let stop_at = self.idle.renew(now);
                info!(%stop_at, "startup complete");
            } else if self.idle.refresh_if_elapsed(now) {
                debug!(stop_at = %self.idle.stop_at(), "deadline had elapsed, renewed");
            }
        } else if reported == Status::Stopped && previous == Status::Stopping {
            info!("shutdown complete");
        } else if reported == Status::Unhealthy {
            warn!(from = %previous, "resources reported unhealthy");
        }
    }

    /// Event loop. Returns the final snapshot once `shutdown` fires or every
    /// request handle is gone.
    pub async fn run(
        mut self,
        mut pings: mpsc::Receiver<Ping>,
        mut health: mpsc::Receiver<Status>,
        mut shutdown: watch::Receiver<bool>,
    ) -> LifecycleSnapshot {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(status = %self.status, "lifecycle actor starting");

        loop {
            tokio::select! {
                ping = pings.recv() => {
                    let Some(ping) = ping else {
                        debug!("request channel closed");
                        break;
                    };
                    let pong = self.handle_ping(ping.kind, Utc::now()).await;
                    // The caller may have gone away; nothing to do then.
                    let _ = ping.reply.send(pong);
                }
                Some(reported) = health.recv() => {
                    self.on_health(reported, Utc::now());
                }
                _ = ticker.tick() => {
                    self.on_tick(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    debug!("lifecycle actor shutting down");
                    break;
                }
            }
        }

        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use flywheel_compute::{InstanceState, MemoryController};
    use flywheel_core::Config;

    use super::*;
    use crate::ping::channel;

    const IDLE: Duration = Duration::from_secs(3 * 3600);

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn actor() -> (Arc<MemoryController>, LifecycleActor) {
        let config =
            Config::from_json_str(r#"{ "endpoint": "b", "instances": ["i-1", "i-2"] }"#).unwrap();
        let controller = Arc::new(MemoryController::from_config(&config).recording());
        let fleet = Fleet::new(controller.clone(), &config);
        (controller, LifecycleActor::new(fleet, IDLE))
    }

    fn started() -> (Arc<MemoryController>, LifecycleActor) {
        let (controller, mut actor) = actor();
        actor.restore(
            LifecycleSnapshot {
                status: Status::Started,
                stop_at: now() + TimeDelta::hours(1),
                ..Default::default()
            },
            now(),
        );
        (controller, actor)
    }

    #[tokio::test]
    async fn start_from_stopped_issues_command() {
        let (controller, mut actor) = actor();

        let pong = actor.handle_ping(PingKind::Start, now()).await;

        assert_eq!(pong.status, Status::Starting);
        assert_eq!(pong.last_started, Some(now()));
        assert!(pong.error.is_none());
        assert_eq!(controller.state("i-1"), Some(InstanceState::Running));
    }

    #[tokio::test]
    async fn failed_start_keeps_status_and_reports_error() {
        let (controller, mut actor) = actor();
        controller.fail("start_instances");

        let pong = actor.handle_ping(PingKind::Start, now()).await;

        assert_eq!(pong.status, Status::Stopped);
        assert!(pong.error.unwrap().contains("start_instances"));
        // The error belongs to that reply only.
        assert!(actor.handle_ping(PingKind::Status, now()).await.error.is_none());
    }

    #[tokio::test]
    async fn stop_from_started_issues_command() {
        let (controller, mut actor) = started();

        let pong = actor.handle_ping(PingKind::Stop, now()).await;

        assert_eq!(pong.status, Status::Stopping);
        assert_eq!(pong.last_stopped, Some(now()));
        assert_eq!(controller.calls(), vec!["stop_instances i-1,i-2".to_string()]);
    }

    #[tokio::test]
    async fn failed_stop_stays_started() {
        let (controller, mut actor) = started();
        controller.fail("stop_instances");

        let pong = actor.handle_ping(PingKind::Stop, now()).await;
        assert_eq!(pong.status, Status::Started);
        assert!(pong.error.is_some());
    }

    #[tokio::test]
    async fn commands_outside_their_state_are_noops() {
        let (controller, mut actor) = actor();
        assert_eq!(actor.handle_ping(PingKind::Stop, now()).await.status, Status::Stopped);

        actor.on_health(Status::Starting, now());
        assert_eq!(actor.handle_ping(PingKind::Start, now()).await.status, Status::Starting);
        assert_eq!(actor.handle_ping(PingKind::Stop, now()).await.status, Status::Starting);

        actor.on_health(Status::Stopping, now());
        assert_eq!(actor.handle_ping(PingKind::Start, now()).await.status, Status::Stopping);
        assert!(controller.calls().is_empty());
    }

    #[tokio::test]
    async fn status_query_never_moves_deadline() {
        let (_, mut actor) = started();
        let before = actor.snapshot().stop_at;

        for minutes in 0..5 {
            let pong = actor
                .handle_ping(PingKind::Status, now() + TimeDelta::minutes(minutes))
                .await;
            assert_eq!(pong.stop_at, before);
        }
    }

    #[tokio::test]
    async fn touch_slides_deadline() {
        let (_, mut actor) = started();
        let later = now() + TimeDelta::minutes(30);

        let pong = actor.handle_ping(PingKind::Touch, later).await;
        assert!(pong.stop_at >= later + TimeDelta::hours(3));
    }

    #[tokio::test]
    async fn stop_in_overrides_default_timeout() {
        let (_, mut actor) = started();

        let pong = actor
            .handle_ping(PingKind::StopIn(Duration::from_secs(300)), now())
            .await;
        assert_eq!(pong.stop_at, now() + TimeDelta::minutes(5));
        assert_eq!(pong.status, Status::Started);
    }

    #[tokio::test]
    async fn touch_while_stopped_keeps_deadline() {
        let (_, mut actor) = actor();
        let before = actor.snapshot().stop_at;
        let pong = actor.handle_ping(PingKind::Touch, now()).await;
        assert_eq!(pong.stop_at, before);
    }

    #[tokio::test]
    async fn stop_in_while_stopped_keeps_deadline() {
        let (controller, mut actor) = actor();
        let before = actor.snapshot().stop_at;
        let pong = actor
            .handle_ping(PingKind::StopIn(Duration::from_secs(300)), now())
            .await;
        assert_eq!(pong.status, Status::Stopped);
        assert_eq!(pong.stop_at, before);
        assert!(controller.calls().is_empty());
    }

    #[tokio::test]
    async fn idle_timeout_stops_even_when_command_fails() {
        let (controller, mut actor) = started();
        actor.idle.set_stop_at(now() - TimeDelta::seconds(1));
        controller.fail("stop_instances");

        actor.on_tick(now()).await;

        assert_eq!(actor.status(), Status::Stopping);
        assert!(controller.calls().contains(&"stop_instances i-1,i-2".to_string()));
    }

    #[tokio::test]
    async fn tick_before_deadline_does_nothing() {
        let (controller, mut actor) = started();
        actor.on_tick(now()).await;
        assert_eq!(actor.status(), Status::Started);
        assert!(controller.calls().is_empty());
    }

    #[tokio::test]
    async fn health_started_after_starting_refreshes_deadline() {
        let (_, mut actor) = actor();
        actor.handle_ping(PingKind::Start, now()).await;

        let later = now() + TimeDelta::minutes(2);
        actor.on_health(Status::Started, later);

        assert_eq!(actor.status(), Status::Started);
        assert_eq!(actor.snapshot().stop_at, later + TimeDelta::hours(3));
    }

    #[test]
    fn health_started_keeps_active_override() {
        let (_, mut actor) = started();
        actor.on_health(Status::Unhealthy, now());
        actor.on_health(Status::Started, now());
        assert_eq!(actor.snapshot().stop_at, now() + TimeDelta::hours(1));
    }

    #[test]
    fn health_started_renews_elapsed_deadline() {
        let (_, mut actor) = actor();
        actor.idle.set_stop_at(now() - TimeDelta::hours(5));
        actor.on_health(Status::Started, now());
        assert_eq!(actor.snapshot().stop_at, now() + TimeDelta::hours(3));
    }

    #[test]
    fn health_overrides_in_flight_transition() {
        let (_, mut actor) = started();
        actor.status = Status::Stopping;
        actor.on_health(Status::Started, now());
        assert_eq!(actor.status(), Status::Started);
    }

    #[test]
    fn restore_renews_elapsed_started_deadline() {
        let (_, mut actor) = actor();
        actor.restore(
            LifecycleSnapshot {
                status: Status::Started,
                stop_at: now() - TimeDelta::days(2),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(actor.snapshot().stop_at, now() + TimeDelta::hours(3));
    }

    #[tokio::test]
    async fn run_serves_pings_and_health_until_shutdown() {
        let (_, actor) = actor();
        let (handle, pings) = channel(8);
        let (health_tx, health_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(actor.run(pings, health_rx, shutdown_rx));

        let pong = handle.ping(PingKind::Start).await.unwrap();
        assert_eq!(pong.status, Status::Starting);

        health_tx.send(Status::Started).await.unwrap();
        loop {
            if handle.ping(PingKind::Status).await.unwrap().status == Status::Started {
                break;
            }
            tokio::task::yield_now().await;
        }

        shutdown_tx.send(true).unwrap();
        let last = task.await.unwrap();
        assert_eq!(last.status, Status::Started);
        assert!(last.last_started.is_some());
    }
}
