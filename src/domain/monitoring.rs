use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::id::{NodeId, ResourceId, UserId};
use crate::domain::store::task_store::TaskStore;

/// What a user currently claims, summed per (node, resource) pair.
pub type AllocationProfile = BTreeMap<(NodeId, ResourceId), i64>;

/// A non-fatal failure reported by a downstream system. Collected and
/// logged, never allowed to roll back task or event state.
#[derive(Debug, Clone)]
pub struct SyncError {
    pub message: String,
}

impl SyncError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Pushes a user's current allowance out to the monitoring system's alert
/// thresholds. Invoked by the timed event processor for every user whose
/// task changed status, and by the admission scheduler after an admission.
///
/// The caller computes `profile` under row locks and passes it in, so the
/// collaborator is always handed a consistent snapshot and is never called
/// with a lock held.
pub trait AlertSync: fmt::Debug + Send + Sync {
    fn sync_user_alerts(&self, user: &UserId, as_of: DateTime<Utc>, profile: &AllocationProfile) -> Vec<SyncError>;
}

/// Computes the allocation profile backing a user's alert thresholds at
/// `at`: every scheduled or running task of theirs that has started (or is
/// about to start) by that instant, summed per (node, resource).
pub fn allocation_profile(store: &TaskStore, user: &UserId, at: DateTime<Utc>) -> AllocationProfile {
    let mut profile = AllocationProfile::new();

    for (_, handle) in store.active_tasks_for_user(user, at) {
        let task = handle.read().expect("RwLock poisoned");
        for allocation in &task.allocations {
            *profile.entry((allocation.node.clone(), allocation.resource.clone())).or_insert(0) += allocation.amount;
        }
    }

    profile
}

/// Default alert sink: logs the thresholds it would provision and reports
/// no errors. The real monitoring client lives outside this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSync;

impl AlertSync for LogAlertSync {
    fn sync_user_alerts(&self, user: &UserId, as_of: DateTime<Utc>, profile: &AllocationProfile) -> Vec<SyncError> {
        if profile.is_empty() {
            log::info!("Alert thresholds for user '{}' as of {}: no active claims.", user, as_of);
        }
        for ((node, resource), amount) in profile {
            log::info!("Alert threshold for user '{}' as of {}: {} x '{}' on '{}'.", user, as_of, amount, resource, node);
        }
        Vec::new()
    }
}
