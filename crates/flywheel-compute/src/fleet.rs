//! Fleet — the fixed resource set and its start/stop plans.

use std::collections::BTreeMap;
use std::sync::Arc;

use flywheel_core::Config;
use tracing::info;

use crate::controller::{ControllerResult, ResourceController, REPLACE_UNHEALTHY};

/// The resources one gateway manages, bound to a controller.
#[derive(Clone)]
pub struct Fleet {
    controller: Arc<dyn ResourceController>,
    instances: Vec<String>,
    terminate_groups: BTreeMap<String, u32>,
    stop_groups: Vec<String>,
}

impl Fleet {
    pub fn new(controller: Arc<dyn ResourceController>, config: &Config) -> Self {
        Self {
            controller,
            instances: config.instances.clone(),
            terminate_groups: config.autoscaling.terminate.clone(),
            stop_groups: config.autoscaling.stop.clone(),
        }
    }

    pub fn controller(&self) -> &dyn ResourceController {
        self.controller.as_ref()
    }

    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    pub fn terminate_groups(&self) -> &BTreeMap<String, u32> {
        &self.terminate_groups
    }

    pub fn stop_groups(&self) -> &[String] {
        &self.stop_groups
    }

    /// Start every managed resource.
    ///
    /// Stops at the first failing call. Self-healing of stop-category groups
    /// stays suspended; the health engine resumes it once members are
    /// confirmed running.
    pub async fn start(&self) -> ControllerResult<()> {
        if !self.instances.is_empty() {
            info!(instances = ?self.instances, "starting instances");
            self.controller.start_instances(&self.instances).await?;
        }

        for (group, size) in &self.terminate_groups {
            info!(%group, size, "restoring autoscaling group");
            self.controller.set_group_size(group, *size, *size).await?;
        }

        for group in &self.stop_groups {
            info!(%group, "starting autoscaling group members");
            let members = self.controller.describe_group(group).await?.member_ids();
            if !members.is_empty() {
                self.controller.start_instances(&members).await?;
            }
        }

        Ok(())
    }

    /// Stop every managed resource. Stops at the first failing call.
    pub async fn stop(&self) -> ControllerResult<()> {
        if !self.instances.is_empty() {
            info!(instances = ?self.instances, "stopping instances");
            self.controller.stop_instances(&self.instances).await?;
        }

        for group in self.terminate_groups.keys() {
            info!(%group, "terminating autoscaling group");
            self.controller.set_group_size(group, 0, 0).await?;
        }

        for group in &self.stop_groups {
            info!(%group, "stopping autoscaling group members");
            let description = self.controller.describe_group(group).await?;
            self.controller
                .suspend_process(group, REPLACE_UNHEALTHY)
                .await?;
            let members = description.member_ids();
            if !members.is_empty() {
                self.controller.stop_instances(&members).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::InstanceState;
    use crate::memory::MemoryController;

    fn test_config() -> Config {
        Config::from_json_str(
            r#"{
                "endpoint": "backend.internal",
                "instances": ["i-1", "i-2"],
                "autoscaling": {
                    "terminate": { "web": 3 },
                    "stop": ["workers"]
                }
            }"#,
        )
        .unwrap()
    }

    fn test_fleet() -> (Arc<MemoryController>, Fleet) {
        let config = test_config();
        let controller = Arc::new(MemoryController::from_config(&config).recording());
        let fleet = Fleet::new(controller.clone(), &config);
        (controller, fleet)
    }

    #[tokio::test]
    async fn start_runs_every_resource_category() {
        let (controller, fleet) = test_fleet();

        fleet.start().await.unwrap();

        assert_eq!(controller.state("i-1"), Some(InstanceState::Running));
        assert_eq!(controller.state("workers-0"), Some(InstanceState::Running));
        assert_eq!(controller.group("web").unwrap().max_size, 3);
        assert_eq!(controller.group("web").unwrap().members.len(), 3);
        // Self-healing is not re-enabled at start time.
        assert!(controller.group("workers").unwrap().is_suspended(REPLACE_UNHEALTHY));
    }

    #[tokio::test]
    async fn stop_suspends_self_healing_before_stopping_members() {
        let (controller, fleet) = test_fleet();
        controller.set_suspended("workers", &[]);
        fleet.start().await.unwrap();
        controller.clear_calls();

        fleet.stop().await.unwrap();

        let calls = controller.calls();
        let suspend = calls
            .iter()
            .position(|c| c == "suspend_process workers ReplaceUnhealthy")
            .unwrap();
        let stop_members = calls
            .iter()
            .position(|c| c == "stop_instances workers-0,workers-1")
            .unwrap();
        assert!(suspend < stop_members);
        assert!(calls.contains(&"set_group_size web 0 0".to_string()));
        assert_eq!(controller.state("i-2"), Some(InstanceState::Stopped));
    }

    #[tokio::test]
    async fn start_stops_at_first_failure() {
        let (controller, fleet) = test_fleet();
        controller.fail("start_instances");

        assert!(fleet.start().await.is_err());
        assert!(!controller.calls().iter().any(|c| c.starts_with("set_group_size")));
    }

    #[tokio::test]
    async fn empty_instance_list_skips_controller() {
        let config = Config::from_json_str(
            r#"{ "endpoint": "backend.internal", "autoscaling": { "terminate": { "web": 1 } } }"#,
        )
        .unwrap();
        let controller = Arc::new(MemoryController::from_config(&config).recording());
        let fleet = Fleet::new(controller.clone(), &config);

        fleet.start().await.unwrap();
        assert_eq!(controller.calls(), vec!["set_group_size web 1 1".to_string()]);
    }
}
