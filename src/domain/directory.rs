use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::api::model_dto::{LimitDto, NotificationKindDto, ResourceUnitDto, SystemModelDto};
use crate::domain::id::{GroupId, NodeId, NotificationId, ResourceId, UserId};
use crate::domain::limit::{EffectiveLimits, Limit, LimitScope, apply_scope_limits};
use crate::domain::notification::{Notification, NotificationKind};
use crate::error::{Error, Result};

/// Unit a resource amount is displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceUnit {
    #[default]
    None,
    BytesSi,
    BytesIec,
}

/// A countable quantity a node offers, like CPU cores or memory.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub description: Option<String>,
    pub unit: ResourceUnit,
}

/// A host offering fixed capacities of one or more resources.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub description: Option<String>,
    pub provides: HashMap<ResourceId, i64>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub username: UserId,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: String,
    pub group: GroupId,
    pub subscriptions: Vec<NotificationId>,
}

/// Groups form a tree via parent links. Users belong to exactly one group.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub description: Option<String>,
    pub parent: Option<GroupId>,
    pub subscriptions: Vec<NotificationId>,
}

/// Read-only directory of node capacities, consulted per admission decision
/// and per timeline query.
pub trait NodeCapacityProvider: std::fmt::Debug + Send + Sync {
    /// Total capacity of `resource` on `node`, or `None` if the node does
    /// not provide it.
    fn capacity(&self, node: &NodeId, resource: &ResourceId) -> Option<i64>;
}

/// Resolves the fully merged limits a user is subject to.
pub trait LimitResolver: std::fmt::Debug + Send + Sync {
    fn effective_limits(&self, user: &UserId) -> EffectiveLimits;
}

#[derive(Debug, Default)]
struct DirectoryInner {
    resources: HashMap<ResourceId, ResourceInfo>,
    nodes: HashMap<NodeId, Node>,
    groups: HashMap<GroupId, Group>,
    users: HashMap<UserId, User>,
    limits: Vec<Limit>,
    notifications: HashMap<NotificationId, Notification>,
}

/// In-memory registry of everything the scheduler core reads but does not
/// own: nodes and their capacities, the user/group tree, limits and
/// notification definitions. Managed externally; the core only queries it.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    //--------------------------
    // --- Registry Mutators ---
    //--------------------------

    pub fn add_resource(&self, resource: ResourceInfo) {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        guard.resources.insert(resource.id.clone(), resource);
    }

    pub fn add_node(&self, node: Node) -> Result<()> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        for resource in node.provides.keys() {
            if !guard.resources.contains_key(resource) {
                return Err(Error::NotFound(format!("Resource '{}'", resource)));
            }
        }
        guard.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn add_group(&self, group: Group) -> Result<()> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        if let Some(parent) = &group.parent {
            if !guard.groups.contains_key(parent) {
                return Err(Error::NotFound(format!("Group '{}'", parent)));
            }
        }
        guard.groups.insert(group.id.clone(), group);
        Ok(())
    }

    pub fn add_user(&self, user: User) -> Result<()> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        if !guard.groups.contains_key(&user.group) {
            return Err(Error::NotFound(format!("Group '{}'", user.group)));
        }
        guard.users.insert(user.username.clone(), user);
        Ok(())
    }

    pub fn add_limit(&self, limit: Limit) -> Result<()> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        if !guard.resources.contains_key(&limit.resource) {
            return Err(Error::NotFound(format!("Resource '{}'", limit.resource)));
        }
        for node in &limit.nodes {
            if !guard.nodes.contains_key(node) {
                return Err(Error::NotFound(format!("Node '{}'", node)));
            }
        }
        match &limit.scope {
            LimitScope::User(user) if !guard.users.contains_key(user) => {
                return Err(Error::NotFound(format!("User '{}'", user)));
            }
            LimitScope::Group(group) if !guard.groups.contains_key(group) => {
                return Err(Error::NotFound(format!("Group '{}'", group)));
            }
            _ => {}
        }
        guard.limits.push(limit);
        Ok(())
    }

    pub fn add_notification(&self, notification: Notification) {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        guard.notifications.insert(notification.id.clone(), notification);
    }

    //-------------------
    // --- Accessors ---
    //-------------------

    pub fn user(&self, username: &UserId) -> Option<User> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.users.get(username).cloned()
    }

    pub fn node(&self, node: &NodeId) -> Option<Node> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.nodes.get(node).cloned()
    }

    pub fn notification(&self, id: &NotificationId) -> Option<Notification> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.notifications.get(id).cloned()
    }

    /// All notifications the user receives: their direct subscriptions plus
    /// everything subscribed by any group along the ancestor chain.
    pub fn subscribed_notifications(&self, username: &UserId) -> Vec<Notification> {
        let guard = self.inner.read().expect("RwLock poisoned");

        let user = match guard.users.get(username) {
            Some(user) => user,
            None => return Vec::new(),
        };

        let mut seen: HashSet<NotificationId> = HashSet::new();
        let mut result = Vec::new();

        let mut collect = |ids: &[NotificationId], seen: &mut HashSet<NotificationId>, result: &mut Vec<Notification>| {
            for id in ids {
                if !seen.insert(id.clone()) {
                    continue;
                }
                match guard.notifications.get(id) {
                    Some(notification) => result.push(notification.clone()),
                    None => log::warn!("Subscription references unknown notification '{}'.", id),
                }
            }
        };

        collect(&user.subscriptions, &mut seen, &mut result);

        for group in Self::ancestor_chain(&guard, &user.group) {
            collect(&group.subscriptions, &mut seen, &mut result);
        }

        result
    }

    /// Walks the group tree from `group` up to the root. Defensive against
    /// accidental cycles in the parent links.
    fn ancestor_chain<'a>(inner: &'a DirectoryInner, group: &GroupId) -> Vec<&'a Group> {
        let mut chain = Vec::new();
        let mut visited: HashSet<&GroupId> = HashSet::new();
        let mut current = Some(group);

        while let Some(group_id) = current {
            if !visited.insert(group_id) {
                log::error!("Group hierarchy contains a cycle at '{}'.", group_id);
                break;
            }
            match inner.groups.get(group_id) {
                Some(group) => {
                    current = group.parent.as_ref();
                    chain.push(group);
                }
                None => break,
            }
        }

        chain
    }

    fn limits_for_scope<'a>(inner: &'a DirectoryInner, scope: &LimitScope) -> impl Iterator<Item = &'a Limit> {
        let scope = scope.clone();
        inner.limits.iter().filter(move |limit| limit.scope == scope)
    }

    //-------------------------
    // --- DTO Construction ---
    //-------------------------

    /// Builds a directory from a parsed system model file, validating every
    /// cross reference.
    pub fn from_dto(dto: &SystemModelDto) -> Result<Directory> {
        let directory = Directory::new();

        for notification in &dto.notifications {
            directory.add_notification(Notification {
                id: NotificationId::new(&notification.name),
                description: notification.description.clone(),
                kind: match notification.kind {
                    NotificationKindDto::TaskStart => NotificationKind::TaskStart,
                    NotificationKindDto::TaskEnd => NotificationKind::TaskEnd,
                    NotificationKindDto::Other => NotificationKind::Other,
                },
                time_offset_seconds: notification.time_offset_seconds,
                template: notification.template.clone(),
            });
        }

        for resource in &dto.resources {
            directory.add_resource(ResourceInfo {
                id: ResourceId::new(&resource.name),
                description: resource.description.clone(),
                unit: match resource.unit {
                    ResourceUnitDto::None => ResourceUnit::None,
                    ResourceUnitDto::BytesSi => ResourceUnit::BytesSi,
                    ResourceUnitDto::BytesIec => ResourceUnit::BytesIec,
                },
            });
        }

        for node in &dto.nodes {
            directory.add_node(Node {
                id: NodeId::new(&node.name),
                description: node.description.clone(),
                provides: node.resources.iter().map(|entry| (ResourceId::new(&entry.resource), entry.amount)).collect(),
            })?;
        }

        // Groups may be listed in any order; retry until the parent of
        // every remaining group has been inserted.
        let mut pending: Vec<_> = dto.groups.iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|group| {
                let insertable = match &group.parent {
                    Some(parent) => directory.inner.read().expect("RwLock poisoned").groups.contains_key(&GroupId::new(parent)),
                    None => true,
                };
                if insertable {
                    directory
                        .add_group(Group {
                            id: GroupId::new(&group.name),
                            description: group.description.clone(),
                            parent: group.parent.as_deref().map(GroupId::new),
                            subscriptions: group.notifications.iter().map(NotificationId::new).collect(),
                        })
                        .expect("parent existence was just checked");
                }
                !insertable
            });
            if pending.len() == before {
                return Err(Error::NotFound(format!("Parent group '{}'", pending[0].parent.clone().unwrap_or_default())));
            }
        }

        for user in &dto.users {
            directory.add_user(User {
                username: UserId::new(&user.username),
                name: user.name.clone(),
                surname: user.surname.clone(),
                email: user.email.clone(),
                group: GroupId::new(&user.group),
                subscriptions: user.notifications.iter().map(NotificationId::new).collect(),
            })?;
        }

        for limit in &dto.limits {
            directory.add_limit(Limit {
                name: limit.name.clone(),
                description: limit.description.clone(),
                scope: limit_scope_from_dto(limit)?,
                resource: ResourceId::new(&limit.resource),
                nodes: limit.nodes.iter().map(NodeId::new).collect(),
                amount: limit.amount,
            })?;
        }

        Ok(directory)
    }
}

fn limit_scope_from_dto(limit: &LimitDto) -> Result<LimitScope> {
    match (&limit.user, &limit.group) {
        (Some(_), Some(_)) => {
            Err(Error::Validation("Limit can't have both user and group specified at the same time!".to_string()))
        }
        (Some(user), None) => Ok(LimitScope::User(UserId::new(user))),
        (None, Some(group)) => Ok(LimitScope::Group(GroupId::new(group))),
        (None, None) => Err(Error::Validation("Limit must have either user or group specified!".to_string())),
    }
}

impl NodeCapacityProvider for Directory {
    fn capacity(&self, node: &NodeId, resource: &ResourceId) -> Option<i64> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.nodes.get(node).and_then(|node| node.provides.get(resource)).copied()
    }
}

impl LimitResolver for Directory {
    /// Bottom-up walk of the group tree: the root's limits are applied
    /// first, each child scope overrides its parent for the pairs it names,
    /// and the user's own limits override everything inherited.
    fn effective_limits(&self, user: &UserId) -> EffectiveLimits {
        let guard = self.inner.read().expect("RwLock poisoned");

        let user = match guard.users.get(user) {
            Some(user) => user,
            None => {
                log::warn!("Limit resolution requested for unknown user '{}'.", user);
                return EffectiveLimits::default();
            }
        };

        let chain = Self::ancestor_chain(&guard, &user.group);

        let mut limits = EffectiveLimits::default();
        for group in chain.iter().rev() {
            apply_scope_limits(&mut limits, Self::limits_for_scope(&guard, &LimitScope::Group(group.id.clone())));
        }
        apply_scope_limits(&mut limits, Self::limits_for_scope(&guard, &LimitScope::User(user.username.clone())));

        limits
    }
}
