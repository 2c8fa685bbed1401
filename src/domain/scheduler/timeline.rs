use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::directory::NodeCapacityProvider;
use crate::domain::id::{NodeId, ResourceId};
use crate::domain::scheduler::ledger::ResourceLedger;
use crate::domain::scheduler::sweep::sweep_boundaries;
use crate::domain::store::task_store::{TaskId, TaskStore};
use crate::domain::task::Task;
use crate::error::{Error, Result};

/// One sub-interval of a queried window, annotated with the residual
/// (unreserved) capacity of every (node, resource) pair that is partially
/// consumed during it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub residual: BTreeMap<(NodeId, ResourceId), i64>,
}

/// Builds the residual-capacity timeline over a query window.
///
/// Returned periods are disjoint, ordered by start time, and cover exactly
/// the sub-ranges of the window during which at least one resource is
/// claimed; a gap between periods means full capacity is free there.
#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    store: TaskStore,
    capacity: Arc<dyn NodeCapacityProvider>,
}

impl TimelineBuilder {
    pub fn new(store: TaskStore, capacity: Arc<dyn NodeCapacityProvider>) -> Self {
        Self { store, capacity }
    }

    /// Computes the availability timeline for [`start`, `end`).
    ///
    /// `exclude` leaves one task out of the computation, letting a caller
    /// preview what the window looks like without it.
    pub fn availability(&self, start: DateTime<Utc>, end: DateTime<Utc>, exclude: Option<TaskId>) -> Result<Vec<AvailabilityPeriod>> {
        if start >= end {
            return Err(Error::Validation("Query window start must be before its end!".to_string()));
        }

        // Point-in-time read: snapshot every overlapping active task.
        let tasks: Vec<(TaskId, Task)> = self
            .store
            .active_overlapping(start, end, exclude)
            .into_iter()
            .map(|(id, handle)| (id, handle.read().expect("RwLock poisoned").clone()))
            .collect();

        let mut ledger = ResourceLedger::new();
        for (_, task) in &tasks {
            for allocation in &task.allocations {
                if !ledger.tracks(&allocation.node, &allocation.resource) {
                    let provided = self.capacity.capacity(&allocation.node, &allocation.resource).unwrap_or(0);
                    ledger.track(allocation.node.clone(), allocation.resource.clone(), provided);
                }
            }
        }

        let mut periods: Vec<AvailabilityPeriod> = Vec::new();

        sweep_boundaries::<Error, _>(&tasks, Some((start, end)), |batch| {
            // Apply the whole batch before sampling so no zero-width or
            // half-applied period can be emitted.
            for (_, task) in batch.ends.iter() {
                ledger.apply(&task.allocations, -1);
            }
            for (_, task) in batch.starts.iter() {
                ledger.apply(&task.allocations, 1);
            }

            if ledger.is_idle() {
                return Ok(());
            }

            if let Some(next_time) = batch.next_time {
                if next_time > batch.time {
                    periods.push(AvailabilityPeriod { start: batch.time, end: next_time, residual: ledger.residual() });
                }
            }

            Ok(())
        })?;

        Ok(merge_adjacent(periods))
    }
}

/// Canonical form: adjacent periods with pointwise-identical residual maps
/// are merged into one.
fn merge_adjacent(periods: Vec<AvailabilityPeriod>) -> Vec<AvailabilityPeriod> {
    let mut merged: Vec<AvailabilityPeriod> = Vec::with_capacity(periods.len());

    for period in periods {
        match merged.last_mut() {
            Some(previous) if previous.end == period.start && previous.residual == period.residual => {
                previous.end = period.end;
            }
            _ => merged.push(period),
        }
    }

    merged
}
