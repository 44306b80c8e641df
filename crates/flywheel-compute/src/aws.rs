//! AWS resource controller — EC2 instances and Auto Scaling groups.
//!
//! # Required IAM Permissions
//!
//! ```json
//! {
//!   "Effect": "Allow",
//!   "Action": [
//!     "ec2:StartInstances", "ec2:StopInstances", "ec2:DescribeInstances",
//!     "autoscaling:DescribeAutoScalingGroups", "autoscaling:UpdateAutoScalingGroup",
//!     "autoscaling:SuspendProcesses", "autoscaling:ResumeProcesses",
//!     "autoscaling:SetInstanceHealth"
//!   ],
//!   "Resource": "*"
//! }
//! ```

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::error::DisplayErrorContext;
use tracing::debug;

use crate::controller::*;

pub struct AwsController {
    ec2: aws_sdk_ec2::Client,
    autoscaling: aws_sdk_autoscaling::Client,
}

impl AwsController {
    /// Build clients from the default credential chain for `region`.
    pub async fn from_region(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        debug!(%region, "aws clients initialized");
        Self {
            ec2: aws_sdk_ec2::Client::new(&sdk_config),
            autoscaling: aws_sdk_autoscaling::Client::new(&sdk_config),
        }
    }
}

fn api_error<E: std::error::Error>(operation: &'static str, err: E) -> ControllerError {
    ControllerError::Api {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn clamp_size(size: u32) -> i32 {
    i32::try_from(size).unwrap_or(i32::MAX)
}

#[async_trait]
impl ResourceController for AwsController {
    async fn start_instances(&self, ids: &[String]) -> ControllerResult<()> {
        self.ec2
            .start_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| api_error("StartInstances", e))?;
        Ok(())
    }

    async fn stop_instances(&self, ids: &[String]) -> ControllerResult<()> {
        self.ec2
            .stop_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| api_error("StopInstances", e))?;
        Ok(())
    }

    async fn describe_instances(&self, ids: &[String]) -> ControllerResult<Vec<InstanceObservation>> {
        let resp = self
            .ec2
            .describe_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| api_error("DescribeInstances", e))?;

        let observations = resp
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .map(|instance| InstanceObservation {
                instance_id: instance.instance_id().unwrap_or_default().to_string(),
                state: instance
                    .state()
                    .and_then(|state| state.name())
                    .map(|name| InstanceState::from_label(name.as_str()))
                    .unwrap_or_else(|| InstanceState::Other("unknown".to_string())),
            })
            .collect();
        Ok(observations)
    }

    async fn describe_group(&self, name: &str) -> ControllerResult<GroupDescription> {
        let resp = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name)
            .send()
            .await
            .map_err(|e| api_error("DescribeAutoScalingGroups", e))?;

        let group = resp
            .auto_scaling_groups()
            .first()
            .ok_or_else(|| ControllerError::GroupNotFound(name.to_string()))?;

        Ok(GroupDescription {
            name: name.to_string(),
            members: group
                .instances()
                .iter()
                .map(|member| GroupMember {
                    instance_id: member.instance_id().unwrap_or_default().to_string(),
                    health_status: member.health_status().unwrap_or_default().to_string(),
                })
                .collect(),
            suspended_processes: group
                .suspended_processes()
                .iter()
                .filter_map(|p| p.process_name())
                .map(str::to_string)
                .collect(),
            min_size: group.min_size().unwrap_or(0).max(0) as u32,
            max_size: group.max_size().unwrap_or(0).max(0) as u32,
        })
    }

    async fn set_group_size(&self, name: &str, min: u32, max: u32) -> ControllerResult<()> {
        self.autoscaling
            .update_auto_scaling_group()
            .auto_scaling_group_name(name)
            .min_size(clamp_size(min))
            .max_size(clamp_size(max))
            .send()
            .await
            .map_err(|e| api_error("UpdateAutoScalingGroup", e))?;
        Ok(())
    }

    async fn suspend_process(&self, name: &str, process: &str) -> ControllerResult<()> {
        self.autoscaling
            .suspend_processes()
            .auto_scaling_group_name(name)
            .scaling_processes(process)
            .send()
            .await
            .map_err(|e| api_error("SuspendProcesses", e))?;
        Ok(())
    }

    async fn resume_process(&self, name: &str, process: &str) -> ControllerResult<()> {
        self.autoscaling
            .resume_processes()
            .auto_scaling_group_name(name)
            .scaling_processes(process)
            .send()
            .await
            .map_err(|e| api_error("ResumeProcesses", e))?;
        Ok(())
    }

    async fn set_instance_health(&self, instance_id: &str, status: &str) -> ControllerResult<()> {
        self.autoscaling
            .set_instance_health()
            .instance_id(instance_id)
            .health_status(status)
            .send()
            .await
            .map_err(|e| api_error("SetInstanceHealth", e))?;
        Ok(())
    }
}
