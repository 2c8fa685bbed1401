use std::collections::BTreeMap;

use crate::domain::id::{NodeId, ResourceId};
use crate::domain::task::ResourceAllocation;

/// Per-decision projection of how much of each tracked (node, resource)
/// pair is provided and how much is currently claimed.
///
/// Only pairs registered up front are tracked; applying a task whose
/// allocations name other pairs silently ignores those allocations. The
/// admission sweep registers exactly the candidate's pairs, the timeline
/// builder registers every pair any fetched task touches.
#[derive(Debug, Default, Clone)]
pub struct ResourceLedger {
    provided: BTreeMap<(NodeId, ResourceId), i64>,
    required: BTreeMap<(NodeId, ResourceId), i64>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pair with its provided capacity and zero requirement.
    pub fn track(&mut self, node: NodeId, resource: ResourceId, provided: i64) {
        let key = (node, resource);
        self.provided.insert(key.clone(), provided);
        self.required.entry(key).or_insert(0);
    }

    pub fn tracks(&self, node: &NodeId, resource: &ResourceId) -> bool {
        self.provided.contains_key(&(node.clone(), resource.clone()))
    }

    /// Adds (`sign` = +1) or frees (`sign` = -1) a task's allocations on
    /// every tracked pair.
    pub fn apply(&mut self, allocations: &[ResourceAllocation], sign: i64) {
        for allocation in allocations {
            let key = (allocation.node.clone(), allocation.resource.clone());
            if let Some(required) = self.required.get_mut(&key) {
                *required += sign * allocation.amount;
            }
        }
    }

    /// The first tracked pair whose requirement exceeds its capacity.
    pub fn first_breach(&self) -> Option<(NodeId, ResourceId)> {
        self.required.iter().find_map(|(key, required)| {
            let provided = self.provided.get(key).copied().unwrap_or(0);
            if *required > provided { Some(key.clone()) } else { None }
        })
    }

    /// True while no tracked pair has a non-zero requirement.
    pub fn is_idle(&self) -> bool {
        self.required.values().all(|required| *required == 0)
    }

    /// Residual capacity (provided - required) for every pair with a
    /// non-zero requirement. Pairs nobody claims are omitted: a gap in the
    /// output means full capacity is free.
    pub fn residual(&self) -> BTreeMap<(NodeId, ResourceId), i64> {
        self.required
            .iter()
            .filter(|(_, required)| **required != 0)
            .map(|(key, required)| {
                let provided = self.provided.get(key).copied().unwrap_or(0);
                (key.clone(), provided - required)
            })
            .collect()
    }
}
