use std::collections::HashMap;

use crate::domain::id::{GroupId, NodeId, ResourceId, UserId};

/// Who a limit applies to. Exactly one of user or group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitScope {
    User(UserId),
    Group(GroupId),
}

/// A ceiling on the allocation amount of one resource on a set of nodes.
///
/// Several limits may cover the same (resource, node) pair; resolution is
/// most-restrictive within one scope, while a user limit overrides any
/// inherited group limit and a child group overrides its parent.
#[derive(Debug, Clone)]
pub struct Limit {
    pub name: String,
    pub description: Option<String>,
    pub scope: LimitScope,
    pub resource: ResourceId,
    pub nodes: Vec<NodeId>,
    pub amount: i64,
}

/// Fully resolved limits for one user: (resource, node) -> amount.
pub type EffectiveLimits = HashMap<(ResourceId, NodeId), i64>;

/// Folds one scope's limits into an already-resolved base map.
///
/// Within the scope the most restrictive amount wins; against the base map
/// the scope wins outright (child overrides parent, user overrides group).
pub fn apply_scope_limits<'a>(base: &mut EffectiveLimits, scope_limits: impl Iterator<Item = &'a Limit>) {
    let mut scoped: EffectiveLimits = HashMap::new();

    for limit in scope_limits {
        for node in &limit.nodes {
            scoped
                .entry((limit.resource.clone(), node.clone()))
                .and_modify(|amount| *amount = (*amount).min(limit.amount))
                .or_insert(limit.amount);
        }
    }

    base.extend(scoped);
}
