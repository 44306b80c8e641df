//! flywheel-gate — the HTTP front door.
//!
//! Every request, on any path, goes through one handler:
//!
//! 1. The `flywheel` query parameter picks the action. `config` is answered
//!    straight from configuration.
//! 2. Anything else becomes one ping to the lifecycle actor, and the handler
//!    waits for its reply.
//! 3. `start` redirects to the same URL without the parameter. Other actions
//!    answer with the reply as JSON; browsers are redirected back for actions
//!    that change state.
//! 4. Plain traffic is forwarded to the backend while started and answered
//!    with a local page otherwise.

pub mod action;
pub mod forward;
pub mod handler;
pub mod pages;

use std::sync::Arc;

use axum::Router;
use flywheel_core::Config;
use flywheel_lifecycle::LifecycleHandle;

pub use action::Action;
pub use forward::{ForwardError, Forwarder};

/// Shared state for the gate handler.
#[derive(Clone)]
pub struct GateState {
    pub lifecycle: LifecycleHandle,
    pub config: Arc<Config>,
    pub forwarder: Forwarder,
}

/// Build the gate router. Every path and method reaches the same handler.
pub fn build_router(state: GateState) -> Router {
    Router::new().fallback(handler::gate).with_state(state)
}
