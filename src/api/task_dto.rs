use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::scheduler::admission::{AdmittedTask, TaskRequest};
use crate::domain::scheduler::timeline::AvailabilityPeriod;
use crate::domain::task::{ResourceAllocation, TaskStatus};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAllocationDto {
    pub node: String,
    pub resource: String,
    pub amount: i64,
}

/// A booking request as it arrives from the outside world.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequestDto {
    pub name: String,
    pub description: Option<String>,
    pub owner: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub allocations: Vec<ResourceAllocationDto>,
}

impl TaskRequestDto {
    pub fn into_request(self) -> TaskRequest {
        TaskRequest {
            task: None,
            name: self.name,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            allocations: self
                .allocations
                .into_iter()
                .map(|allocation| ResourceAllocation::new(allocation.node, allocation.resource, allocation.amount))
                .collect(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponseDto {
    pub uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: TaskStatus,
    pub owner: String,
    pub allocations: Vec<ResourceAllocationDto>,
}

impl From<&AdmittedTask> for TaskResponseDto {
    fn from(admitted: &AdmittedTask) -> Self {
        let task = &admitted.task;
        Self {
            uuid: task.uuid.to_string(),
            name: task.name.clone(),
            description: task.description.clone(),
            start_time: task.start_time,
            end_time: task.end_time,
            status: task.status,
            owner: task.owner.to_string(),
            allocations: task
                .allocations
                .iter()
                .map(|allocation| ResourceAllocationDto {
                    node: allocation.node.to_string(),
                    resource: allocation.resource.to_string(),
                    amount: allocation.amount,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResidualDto {
    pub node: String,
    pub resource: String,
    pub free: i64,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityPeriodDto {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub residuals: Vec<ResidualDto>,
}

impl From<&AvailabilityPeriod> for AvailabilityPeriodDto {
    fn from(period: &AvailabilityPeriod) -> Self {
        Self {
            start: period.start,
            end: period.end,
            residuals: period
                .residual
                .iter()
                .map(|((node, resource), free)| ResidualDto { node: node.to_string(), resource: resource.to_string(), free: *free })
                .collect(),
        }
    }
}
