//! Request/reply protocol between request handlers and the actor.

use std::time::Duration;

use flywheel_core::LifecycleSnapshot;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Reply to a [`Ping`]: the snapshot after the request was processed.
pub type Pong = LifecycleSnapshot;

/// What a request asks of the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingKind {
    /// Ordinary traffic. Renews the idle deadline while started.
    Touch,
    Start,
    Stop,
    /// Read-only; never changes the deadline.
    Status,
    /// Replace the idle deadline with `now + duration`.
    StopIn(Duration),
}

#[derive(Debug)]
pub struct Ping {
    pub kind: PingKind,
    pub reply: oneshot::Sender<Pong>,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("lifecycle actor is not running")]
    Closed,

    #[error("lifecycle actor dropped the request without replying")]
    NoReply,
}

/// Cloneable sending side of the actor's request channel.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    tx: mpsc::Sender<Ping>,
}

impl LifecycleHandle {
    /// Send one request and wait for its reply.
    pub async fn ping(&self, kind: PingKind) -> Result<Pong, LifecycleError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Ping { kind, reply })
            .await
            .map_err(|_| LifecycleError::Closed)?;
        rx.await.map_err(|_| LifecycleError::NoReply)
    }
}

/// Create the request channel. The receiver goes to [`crate::LifecycleActor::run`].
pub fn channel(capacity: usize) -> (LifecycleHandle, mpsc::Receiver<Ping>) {
    let (tx, rx) = mpsc::channel(capacity);
    (LifecycleHandle { tx }, rx)
}
