//! In-process resource controller.
//!
//! Every command converges immediately: started instances read `running`,
//! stopped ones read `stopped`. Stopped group members are marked unhealthy
//! by their group, the way a real group health check sees them until the
//! gateway marks them healthy again. Operations can be made to fail by name
//! to exercise error paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use flywheel_core::Config;
use tracing::debug;

use crate::controller::*;

#[derive(Default)]
struct Inner {
    instances: BTreeMap<String, InstanceState>,
    groups: BTreeMap<String, GroupDescription>,
    failing: BTreeSet<&'static str>,
    recording: bool,
    calls: Vec<String>,
    next_member: u32,
}

impl Inner {
    fn check(&mut self, operation: &'static str, detail: String) -> ControllerResult<()> {
        if self.recording {
            self.calls.push(format!("{operation} {detail}").trim_end().to_string());
        }
        if self.failing.contains(operation) {
            return Err(ControllerError::Api {
                operation,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn member_health(&mut self, instance_id: &str, status: &str) {
        for group in self.groups.values_mut() {
            for member in &mut group.members {
                if member.instance_id == instance_id {
                    member.health_status = status.to_string();
                }
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryController {
    inner: Mutex<Inner>,
}

impl MemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a log of every call, read back with [`calls`](Self::calls).
    pub fn recording(self) -> Self {
        self.inner.lock().expect("memory controller lock").recording = true;
        self
    }

    /// Seed the resource set a configuration names, everything stopped.
    ///
    /// Stop-category groups get two members each; terminate-category groups
    /// start scaled to zero.
    pub fn from_config(config: &Config) -> Self {
        let controller = Self::new();
        for id in &config.instances {
            controller.add_instance(id, InstanceState::Stopped);
        }
        for name in &config.autoscaling.stop {
            let members: Vec<String> = (0..2).map(|n| format!("{name}-{n}")).collect();
            controller.add_group(name, &members, 2, 2);
            for member in &members {
                controller.add_instance(member, InstanceState::Stopped);
            }
            let mut inner = controller.inner.lock().expect("memory controller lock");
            if let Some(group) = inner.groups.get_mut(name) {
                group.suspended_processes.push(REPLACE_UNHEALTHY.to_string());
            }
        }
        for name in config.autoscaling.terminate.keys() {
            controller.add_group(name, &[], 0, 0);
        }
        controller
    }

    pub fn add_instance(&self, id: &str, state: InstanceState) {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.instances.insert(id.to_string(), state);
    }

    /// Register a group; members report healthy.
    pub fn add_group(&self, name: &str, member_ids: &[String], min: u32, max: u32) {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.groups.insert(
            name.to_string(),
            GroupDescription {
                name: name.to_string(),
                members: member_ids
                    .iter()
                    .map(|id| GroupMember {
                        instance_id: id.clone(),
                        health_status: HEALTHY.to_string(),
                    })
                    .collect(),
                suspended_processes: Vec::new(),
                min_size: min,
                max_size: max,
            },
        );
    }

    pub fn set_state(&self, id: &str, state: InstanceState) {
        self.add_instance(id, state);
    }

    pub fn state(&self, id: &str) -> Option<InstanceState> {
        let inner = self.inner.lock().expect("memory controller lock");
        inner.instances.get(id).cloned()
    }

    pub fn group(&self, name: &str) -> Option<GroupDescription> {
        let inner = self.inner.lock().expect("memory controller lock");
        inner.groups.get(name).cloned()
    }

    /// Overwrite a group's suspended process list.
    pub fn set_suspended(&self, name: &str, processes: &[&str]) {
        let mut inner = self.inner.lock().expect("memory controller lock");
        if let Some(group) = inner.groups.get_mut(name) {
            group.suspended_processes = processes.iter().map(|p| p.to_string()).collect();
        }
    }

    pub fn set_member_health(&self, instance_id: &str, status: &str) {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.member_health(instance_id, status);
    }

    /// Make every subsequent call to `operation` fail.
    pub fn fail(&self, operation: &'static str) {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.failing.remove(operation);
    }

    /// Calls received so far, as "operation args". Empty unless recording.
    pub fn calls(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("memory controller lock");
        inner.calls.clone()
    }

    pub fn clear_calls(&self) {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.calls.clear();
    }
}

#[async_trait]
impl ResourceController for MemoryController {
    async fn start_instances(&self, ids: &[String]) -> ControllerResult<()> {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.check("start_instances", ids.join(","))?;
        for id in ids {
            inner.instances.insert(id.clone(), InstanceState::Running);
        }
        debug!(?ids, "memory: instances started");
        Ok(())
    }

    async fn stop_instances(&self, ids: &[String]) -> ControllerResult<()> {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.check("stop_instances", ids.join(","))?;
        for id in ids {
            inner.instances.insert(id.clone(), InstanceState::Stopped);
            inner.member_health(id, "Unhealthy");
        }
        debug!(?ids, "memory: instances stopped");
        Ok(())
    }

    async fn describe_instances(&self, ids: &[String]) -> ControllerResult<Vec<InstanceObservation>> {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.check("describe_instances", ids.join(","))?;
        ids.iter()
            .map(|id| match inner.instances.get(id) {
                Some(state) => Ok(InstanceObservation {
                    instance_id: id.clone(),
                    state: state.clone(),
                }),
                None => Err(ControllerError::Api {
                    operation: "describe_instances",
                    message: format!("unknown instance {id}"),
                }),
            })
            .collect()
    }

    async fn describe_group(&self, name: &str) -> ControllerResult<GroupDescription> {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.check("describe_group", name.to_string())?;
        inner
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| ControllerError::GroupNotFound(name.to_string()))
    }

    async fn set_group_size(&self, name: &str, min: u32, max: u32) -> ControllerResult<()> {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.check("set_group_size", format!("{name} {min} {max}"))?;

        let Inner {
            groups,
            instances,
            next_member,
            ..
        } = &mut *inner;
        let group = groups
            .get_mut(name)
            .ok_or_else(|| ControllerError::GroupNotFound(name.to_string()))?;
        group.min_size = min;
        group.max_size = max;

        while group.members.len() > max as usize {
            if let Some(member) = group.members.pop() {
                instances.insert(member.instance_id, InstanceState::Terminated);
            }
        }
        while group.members.len() < max as usize {
            let id = format!("{name}-m{next_member}");
            *next_member += 1;
            instances.insert(id.clone(), InstanceState::Running);
            group.members.push(GroupMember {
                instance_id: id,
                health_status: HEALTHY.to_string(),
            });
        }
        Ok(())
    }

    async fn suspend_process(&self, name: &str, process: &str) -> ControllerResult<()> {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.check("suspend_process", format!("{name} {process}"))?;
        let group = inner
            .groups
            .get_mut(name)
            .ok_or_else(|| ControllerError::GroupNotFound(name.to_string()))?;
        if !group.is_suspended(process) {
            group.suspended_processes.push(process.to_string());
        }
        Ok(())
    }

    async fn resume_process(&self, name: &str, process: &str) -> ControllerResult<()> {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.check("resume_process", format!("{name} {process}"))?;
        let group = inner
            .groups
            .get_mut(name)
            .ok_or_else(|| ControllerError::GroupNotFound(name.to_string()))?;
        group.suspended_processes.retain(|p| p != process);
        Ok(())
    }

    async fn set_instance_health(&self, instance_id: &str, status: &str) -> ControllerResult<()> {
        let mut inner = self.inner.lock().expect("memory controller lock");
        inner.check("set_instance_health", format!("{instance_id} {status}"))?;
        inner.member_health(instance_id, status);
        Ok(())
    }
}
