use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::id::{NodeId, ResourceId, UserId};

/// Lifecycle state of a task.
///
/// The order, from earliest to latest, is:
/// 1. `Scheduled`
/// 2. `Running`
/// 3. `Finished`
///
/// Status only ever moves forward, and only the timed event processor
/// moves it.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskStatus {
    /// The task has been admitted but its start instant has not been reached.
    Scheduled,
    /// The task's interval contains the current instant.
    Running,
    /// The task's end instant has passed.
    Finished,
}

/// One claim of `amount` units of a resource on a node, owned by a task.
/// It is a claim for the task's interval only, not a guarantee beyond it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ResourceAllocation {
    pub node: NodeId,
    pub resource: ResourceId,
    pub amount: i64,
}

impl ResourceAllocation {
    pub fn new(node: impl Into<NodeId>, resource: impl Into<ResourceId>, amount: i64) -> Self {
        Self { node: node.into(), resource: resource.into(), amount }
    }
}

/// A time-boxed claim on one or more (node, resource) pairs.
#[derive(Debug, Clone)]
pub struct Task {
    /// Public identity, stable across reschedules.
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: TaskStatus,
    pub owner: UserId,
    pub allocations: Vec<ResourceAllocation>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        owner: UserId,
        allocations: Vec<ResourceAllocation>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            description,
            start_time,
            end_time,
            status: TaskStatus::Scheduled,
            owner,
            allocations,
        }
    }

    /// Scheduled and running tasks hold their claims; finished ones do not.
    pub fn is_active(&self) -> bool {
        matches!(self.status, TaskStatus::Scheduled | TaskStatus::Running)
    }

    /// Strict interval overlap. Exactly-touching intervals do not overlap,
    /// so a task ending at `T` frees its capacity for one starting at `T`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }
}
