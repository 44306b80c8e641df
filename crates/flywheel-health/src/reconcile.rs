//! One reconciliation pass over the fleet.

use flywheel_compute::{
    ControllerResult, Fleet, GroupDescription, InstanceState, HEALTHY, REPLACE_UNHEALTHY,
};
use tracing::{debug, error, info, warn};

use crate::tally::{HealthTally, Resolution, UnhealthyCause};

/// Turns raw provider observations into a single [`Resolution`].
#[derive(Clone)]
pub struct Reconciler {
    fleet: Fleet,
}

impl Reconciler {
    pub fn new(fleet: Fleet) -> Self {
        Self { fleet }
    }

    /// Run a full pass. Any failed query yields `Unhealthy` for this pass.
    pub async fn reconcile(&self) -> Resolution {
        let resolution = match self.observe().await {
            Ok(tally) => {
                debug!(%tally, "reconciliation tally");
                tally.resolve()
            }
            Err(e) => {
                warn!(error = %e, "reconciliation pass failed");
                Resolution::unhealthy(UnhealthyCause::ObservationFailed(e.to_string()))
            }
        };

        if let Some(cause) = resolution.cause.as_ref().filter(|c| c.requires_intervention()) {
            error!(%cause, "resources were terminated, manual intervention required");
        }
        resolution
    }

    /// Query every resource and tally its state, running the self-heal
    /// handshake for stop-category groups along the way.
    pub async fn observe(&self) -> ControllerResult<HealthTally> {
        let mut tally = HealthTally::new();
        let controller = self.fleet.controller();

        if !self.fleet.instances().is_empty() {
            for observation in controller.describe_instances(self.fleet.instances()).await? {
                tally.record(observation.state);
            }
        }

        for name in self.fleet.stop_groups() {
            let group = controller.describe_group(name).await?;
            let ids = group.member_ids();
            if ids.is_empty() {
                continue;
            }
            let observations = controller.describe_instances(&ids).await?;
            let all_running = observations
                .iter()
                .all(|o| o.state == InstanceState::Running);
            for observation in observations {
                tally.record(observation.state);
            }
            if all_running && group.is_suspended(REPLACE_UNHEALTHY) {
                self.resume_self_healing(&group).await?;
            }
        }

        for name in self.fleet.terminate_groups().keys() {
            let group = controller.describe_group(name).await?;
            tally.record(terminate_group_state(&group));
        }

        Ok(tally)
    }

    /// Mark every member healthy, then let the group replace unhealthy
    /// members again.
    async fn resume_self_healing(&self, group: &GroupDescription) -> ControllerResult<()> {
        let controller = self.fleet.controller();
        for member in &group.members {
            controller
                .set_instance_health(&member.instance_id, HEALTHY)
                .await?;
        }
        controller
            .resume_process(&group.name, REPLACE_UNHEALTHY)
            .await?;
        info!(group = %group.name, members = group.members.len(), "group self-healing resumed");
        Ok(())
    }
}

/// Collapse a terminate-category group into one raw state.
fn terminate_group_state(group: &GroupDescription) -> InstanceState {
    if group.max_size == 0 {
        if group.members.is_empty() {
            InstanceState::Stopped
        } else {
            InstanceState::Stopping
        }
    } else if !group.members.is_empty() && group.members.iter().all(|m| m.is_healthy()) {
        InstanceState::Running
    } else {
        InstanceState::Pending
    }
}
