//! flywheel-compute — the compute resources behind the gateway.
//!
//! # Architecture
//!
//! ```text
//! Fleet (start / stop plans from the Config)
//!   └── dyn ResourceController
//!         ├── AwsController     (EC2 + Auto Scaling APIs)
//!         └── MemoryController  (in-process, converges instantly)
//! ```
//!
//! A [`ResourceController`] exposes the raw cloud operations. The [`Fleet`]
//! knows the fixed resource set from configuration and turns "start" and
//! "stop" into the ordered sequence of controller calls, including the
//! suspension of group self-healing before stop-category groups are shut
//! down. Re-enabling self-healing is left to the health engine.

pub mod aws;
pub mod controller;
pub mod fleet;
pub mod memory;

pub use aws::AwsController;
pub use controller::{
    ControllerError, ControllerResult, GroupDescription, GroupMember, InstanceObservation,
    InstanceState, ResourceController, HEALTHY, REPLACE_UNHEALTHY,
};
pub use fleet::Fleet;
pub use memory::MemoryController;
