//! flywheel-lifecycle — the single owner of the lifecycle status.
//!
//! One task runs [`LifecycleActor::run`] and is the only writer of the
//! status, the start/stop timestamps and the idle deadline. Everything else
//! talks to it through a [`LifecycleHandle`]: each request carries its own
//! one-shot reply slot and receives exactly one snapshot back.
//!
//! The actor merges three inputs and fully processes one before taking the
//! next:
//!
//! - pings from request handlers (start, stop, status, stop-in, touch)
//! - a one-second tick that enforces the idle deadline
//! - status updates from the health monitor, which always win over the
//!   actor's own idea of where a transition stands

pub mod actor;
pub mod idle;
pub mod ping;

pub use actor::LifecycleActor;
pub use idle::IdleTimer;
pub use ping::{channel, LifecycleError, LifecycleHandle, Ping, PingKind, Pong};
