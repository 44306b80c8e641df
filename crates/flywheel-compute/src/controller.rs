//! The resource controller seam.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Group process that replaces members failing the group health check.
pub const REPLACE_UNHEALTHY: &str = "ReplaceUnhealthy";

/// Health status value accepted by `set_instance_health`.
pub const HEALTHY: &str = "Healthy";

pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("autoscaling group not found: {0}")]
    GroupNotFound(String),
}

/// Raw lifecycle label reported for a single compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    ShuttingDown,
    Stopped,
    Terminated,
    /// Any label the gateway does not interpret.
    Other(String),
}

impl InstanceState {
    pub fn from_label(label: &str) -> Self {
        match label {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "stopping" => InstanceState::Stopping,
            "shutting-down" => InstanceState::ShuttingDown,
            "stopped" => InstanceState::Stopped,
            "terminated" => InstanceState::Terminated,
            other => InstanceState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Stopped => "stopped",
            InstanceState::Terminated => "terminated",
            InstanceState::Other(label) => label,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceObservation {
    pub instance_id: String,
    pub state: InstanceState,
}

/// A member of an autoscaling group as the group itself sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub instance_id: String,
    /// Group-level health check verdict ("Healthy" / "Unhealthy").
    pub health_status: String,
}

impl GroupMember {
    pub fn is_healthy(&self) -> bool {
        self.health_status.eq_ignore_ascii_case(HEALTHY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    pub name: String,
    pub members: Vec<GroupMember>,
    pub suspended_processes: Vec<String>,
    pub min_size: u32,
    pub max_size: u32,
}

impl GroupDescription {
    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.instance_id.clone()).collect()
    }

    pub fn is_suspended(&self, process: &str) -> bool {
        self.suspended_processes.iter().any(|p| p == process)
    }
}

/// Imperative operations on the compute provider.
///
/// Calls return once the provider accepted the request; convergence of the
/// underlying resources is observed later through `describe_*`.
#[async_trait]
pub trait ResourceController: Send + Sync {
    async fn start_instances(&self, ids: &[String]) -> ControllerResult<()>;

    async fn stop_instances(&self, ids: &[String]) -> ControllerResult<()>;

    async fn describe_instances(&self, ids: &[String]) -> ControllerResult<Vec<InstanceObservation>>;

    async fn describe_group(&self, name: &str) -> ControllerResult<GroupDescription>;

    async fn set_group_size(&self, name: &str, min: u32, max: u32) -> ControllerResult<()>;

    async fn suspend_process(&self, name: &str, process: &str) -> ControllerResult<()>;

    async fn resume_process(&self, name: &str, process: &str) -> ControllerResult<()>;

    async fn set_instance_health(&self, instance_id: &str, status: &str) -> ControllerResult<()>;
}
