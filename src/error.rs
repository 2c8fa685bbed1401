use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::id::{NodeId, ResourceId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON input: {0}")]
    DeserializationError(#[from] serde_json::Error),

    /// Malformed request, rejected before anything is persisted.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A requested allocation exceeds the owner's effective limit.
    /// Rejected before any lock is taken.
    #[error("Requested {requested} of resource '{resource}' on node '{node}' exceeds the effective limit of {limit}")]
    LimitExceeded { resource: ResourceId, node: NodeId, requested: i64, limit: i64 },

    /// The admission sweep found an instant at which the node cannot cover
    /// the cumulative requirement.
    #[error("Not enough capacity of resource '{resource}' on node '{node}' around {at}")]
    CapacityExceeded { node: NodeId, resource: ResourceId, at: DateTime<Utc> },

    /// A requested (node, resource) pair the node directory knows nothing about.
    #[error("Node '{node}' does not provide resource '{resource}'")]
    UnknownCapacity { node: NodeId, resource: ResourceId },

    /// The update would alter the start of a running task or touch a finished one.
    #[error("Task state forbids this change: {0}")]
    StateConflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Task is owned by another user")]
    PermissionDenied,
}

pub type Result<T> = std::result::Result<T, Error>;
