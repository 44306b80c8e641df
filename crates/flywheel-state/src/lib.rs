//! flywheel-state — persistence of the lifecycle snapshot.
//!
//! The gateway keeps no database; the only durable state is one JSON
//! document holding the last known [`LifecycleSnapshot`], read once at
//! startup and written whole at shutdown.
//!
//! [`LifecycleSnapshot`]: flywheel_core::LifecycleSnapshot

pub mod error;
pub mod store;

pub use error::{StateError, StateResult};
pub use store::StatusFile;
