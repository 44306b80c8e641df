//! flywheel-core — shared vocabulary for the Flywheel scale-to-zero gateway.
//!
//! Holds the lifecycle [`Status`] and [`LifecycleSnapshot`] types that every
//! other crate speaks, the gateway [`Config`] model with its loader and
//! validation, and the compound duration codec used both by the config file
//! and by the `stop-in:<duration>` request action.

pub mod config;
pub mod duration;
pub mod types;
pub mod version;

pub use config::{AutoScalingConfig, Config, ConfigError, ControllerKind};
pub use duration::{format_duration, parse_duration};
pub use types::*;
pub use version::VersionInfo;
