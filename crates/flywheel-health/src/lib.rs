//! flywheel-health — reconciles real infrastructure state into one status.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor (interval task, first pass immediately)
//!   └── Reconciler::reconcile()
//!         ├── describe standalone instances        ─┐
//!         ├── describe stop-group members          ─┼─► HealthTally (fresh per pass)
//!         ├── size/health of terminate groups      ─┘        │
//!         ├── self-heal handshake for stop groups            ▼
//!         └────────────────────────────────────────► Resolution { status, cause }
//!                                                         │
//!                                   mpsc::Sender<Status> ─┘ → lifecycle actor
//! ```
//!
//! # Resolution order
//!
//! First match wins: starting mixed with stopping, running mixed with
//! stopped, any terminated instance (manual intervention), then pending,
//! stopping, running, stopped. An empty or unrecognized tally, or any
//! failed query, resolves to `Unhealthy`.
//!
//! # Self-heal handshake
//!
//! A restarted group member briefly fails its group's health check. The
//! engine only resumes the group's `ReplaceUnhealthy` process after every
//! member reads `running`, and marks each member healthy first so the group
//! does not replace the instances that were just started.

pub mod monitor;
pub mod reconcile;
pub mod tally;

pub use monitor::HealthMonitor;
pub use reconcile::Reconciler;
pub use tally::{HealthTally, Resolution, UnhealthyCause};
