use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::clock::SharedClock;
use crate::domain::directory::{LimitResolver, NodeCapacityProvider};
use crate::domain::event::Event;
use crate::domain::id::UserId;
use crate::domain::monitoring::{AlertSync, allocation_profile};
use crate::domain::notification::NotificationScheduler;
use crate::domain::processor::WakeupSignal;
use crate::domain::scheduler::ledger::ResourceLedger;
use crate::domain::scheduler::sweep::sweep_boundaries;
use crate::domain::store::task_store::{TaskId, TaskStore};
use crate::domain::task::{ResourceAllocation, Task, TaskStatus};
use crate::error::{Error, Result};

/// A candidate booking: a new task, or a change to an existing one when
/// `task` is set.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task: Option<TaskId>,
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub allocations: Vec<ResourceAllocation>,
}

/// The committed outcome of a successful admission.
#[derive(Debug, Clone)]
pub struct AdmittedTask {
    pub id: TaskId,
    pub task: Task,
}

/// Decides whether a candidate task fits on its nodes throughout its whole
/// interval, honoring the owner's effective limits, and persists it if so.
///
/// The scheduler is the only writer of initial task placement and of
/// start/end event times; it never touches task status.
#[derive(Debug, Clone)]
pub struct AdmissionScheduler {
    store: TaskStore,
    capacity: Arc<dyn NodeCapacityProvider>,
    limits: Arc<dyn LimitResolver>,
    notifications: Arc<dyn NotificationScheduler>,
    alert_sync: Arc<dyn AlertSync>,
    wakeup: WakeupSignal,
    clock: SharedClock,
}

impl AdmissionScheduler {
    pub fn new(
        store: TaskStore,
        capacity: Arc<dyn NodeCapacityProvider>,
        limits: Arc<dyn LimitResolver>,
        notifications: Arc<dyn NotificationScheduler>,
        alert_sync: Arc<dyn AlertSync>,
        wakeup: WakeupSignal,
        clock: SharedClock,
    ) -> Self {
        Self { store, capacity, limits, notifications, alert_sync, wakeup, clock }
    }

    /// Admits or rejects a candidate booking on behalf of `owner`.
    ///
    /// The whole decision and write happen under the store's admission
    /// gate; the post-commit side effects (notification planning, alert
    /// sync, processor wake-up) run outside of it.
    pub fn schedule(&self, request: TaskRequest, owner: &UserId) -> Result<AdmittedTask> {
        self.validate(&request)?;

        // An update that leaves the schedule untouched only persists name
        // and description; limits are not re-checked retroactively for an
        // already-admitted schedule.
        if let Some(task_id) = request.task {
            if let Some(admitted) = self.try_fast_update(task_id, &request, owner)? {
                return Ok(admitted);
            }
        }

        // Limit check runs before any lock is taken.
        self.check_limits(&request, owner)?;

        let admitted = {
            let _gate = self.store.admission_lock();

            match request.task {
                Some(task_id) => self.apply_update(task_id, &request, owner)?,
                None => self.apply_create(&request, owner)?,
            }
        };

        match admitted {
            Some(admitted) => {
                self.after_commit(&admitted);
                Ok(admitted)
            }
            // A concurrent reschedule landed between the fast-path probe and
            // the gate and made this request a no-op; report current state.
            None => {
                let task_id = request.task.expect("a missing admission outcome implies an update");
                let handle = self.store.get_task(task_id).ok_or_else(|| Error::NotFound("Task".to_string()))?;
                let task = handle.read().expect("RwLock poisoned").clone();
                Ok(AdmittedTask { id: task_id, task })
            }
        }
    }

    /// Applies an update that does not touch the schedule, if that is what
    /// `request` is. Ownership and state constraints still hold.
    fn try_fast_update(&self, task_id: TaskId, request: &TaskRequest, owner: &UserId) -> Result<Option<AdmittedTask>> {
        let handle = self.store.get_task(task_id).ok_or_else(|| Error::NotFound("Task".to_string()))?;
        let mut task = handle.write().expect("RwLock poisoned");

        if task.owner != *owner {
            return Err(Error::PermissionDenied);
        }
        if task.status == TaskStatus::Finished {
            return Err(Error::StateConflict("a finished task cannot be changed".to_string()));
        }

        let schedule_changed =
            task.start_time != request.start_time || task.end_time != request.end_time || task.allocations != request.allocations;
        if schedule_changed {
            return Ok(None);
        }

        task.name = request.name.clone();
        task.description = request.description.clone();
        Ok(Some(AdmittedTask { id: task_id, task: task.clone() }))
    }

    fn validate(&self, request: &TaskRequest) -> Result<()> {
        if request.start_time >= request.end_time {
            return Err(Error::Validation("Task start time must be before its end time!".to_string()));
        }
        if request.allocations.is_empty() {
            return Err(Error::Validation("Task must have at least one resource allocation!".to_string()));
        }
        if request.allocations.iter().any(|allocation| allocation.amount < 0) {
            return Err(Error::Validation("Resource allocation amounts must not be negative!".to_string()));
        }
        Ok(())
    }

    fn check_limits(&self, request: &TaskRequest, owner: &UserId) -> Result<()> {
        let effective = self.limits.effective_limits(owner);

        for allocation in &request.allocations {
            let key = (allocation.resource.clone(), allocation.node.clone());
            if let Some(limit) = effective.get(&key) {
                if allocation.amount > *limit {
                    return Err(Error::LimitExceeded {
                        resource: allocation.resource.clone(),
                        node: allocation.node.clone(),
                        requested: allocation.amount,
                        limit: *limit,
                    });
                }
            }
        }

        Ok(())
    }

    /// Runs the interval sweep over every active task overlapping the
    /// candidate, checking the cumulative requirement against capacity at
    /// each local maximum (just before capacity is freed, and once after
    /// all boundaries are consumed).
    fn check_feasibility(&self, request: &TaskRequest, exclude: Option<TaskId>) -> Result<()> {
        let mut ledger = ResourceLedger::new();
        for allocation in &request.allocations {
            match self.capacity.capacity(&allocation.node, &allocation.resource) {
                Some(provided) => {
                    if !ledger.tracks(&allocation.node, &allocation.resource) {
                        ledger.track(allocation.node.clone(), allocation.resource.clone(), provided);
                    }
                }
                None => {
                    return Err(Error::UnknownCapacity { node: allocation.node.clone(), resource: allocation.resource.clone() });
                }
            }
        }

        // Seed with the candidate's own requirement; it claims its pairs
        // during the whole swept range.
        ledger.apply(&request.allocations, 1);

        let overlapping: Vec<(TaskId, Task)> = self
            .store
            .active_overlapping(request.start_time, request.end_time, exclude)
            .into_iter()
            .map(|(id, handle)| (id, handle.read().expect("RwLock poisoned").clone()))
            .collect();

        log::debug!("Admission sweep for '{}' against {} overlapping task(s).", request.name, overlapping.len());

        sweep_boundaries::<Error, _>(&overlapping, None, |batch| {
            // The cumulative requirement peaks right before a batch of
            // frees; that is where feasibility has to hold.
            if !batch.ends.is_empty() {
                if let Some((node, resource)) = ledger.first_breach() {
                    return Err(Error::CapacityExceeded { node, resource, at: batch.time });
                }
                for (_, task) in batch.ends.iter() {
                    ledger.apply(&task.allocations, -1);
                }
            }
            for (_, task) in batch.starts.iter() {
                ledger.apply(&task.allocations, 1);
            }
            Ok(())
        })?;

        // Last overlapping section, or the candidate alone when nothing
        // overlaps at all.
        if let Some((node, resource)) = ledger.first_breach() {
            return Err(Error::CapacityExceeded { node, resource, at: request.start_time });
        }

        Ok(())
    }

    fn apply_create(&self, request: &TaskRequest, owner: &UserId) -> Result<Option<AdmittedTask>> {
        self.check_feasibility(request, None)?;

        let task = Task::new(
            request.name.clone(),
            request.description.clone(),
            request.start_time,
            request.end_time,
            owner.clone(),
            request.allocations.clone(),
        );
        let snapshot = task.clone();
        let id = self.store.insert_task(task);

        self.store.insert_event(Event::task_start(&request.name, id, request.start_time));
        self.store.insert_event(Event::task_end(&request.name, id, request.end_time));

        log::info!("Admitted task '{}' ({} - {}) for user '{}'.", request.name, request.start_time, request.end_time, owner);

        Ok(Some(AdmittedTask { id, task: snapshot }))
    }

    fn apply_update(&self, task_id: TaskId, request: &TaskRequest, owner: &UserId) -> Result<Option<AdmittedTask>> {
        let handle = self.store.get_task(task_id).ok_or_else(|| Error::NotFound("Task".to_string()))?;
        let prior = handle.read().expect("RwLock poisoned").clone();

        if prior.owner != *owner {
            return Err(Error::PermissionDenied);
        }
        if prior.status == TaskStatus::Finished {
            return Err(Error::StateConflict("a finished task cannot be changed".to_string()));
        }

        let schedule_changed =
            prior.start_time != request.start_time || prior.end_time != request.end_time || prior.allocations != request.allocations;

        if !schedule_changed {
            // Fast path: persist the field changes, skip feasibility.
            let mut task = handle.write().expect("RwLock poisoned");
            task.name = request.name.clone();
            task.description = request.description.clone();
            return Ok(None);
        }

        if prior.status == TaskStatus::Running && prior.start_time != request.start_time {
            return Err(Error::StateConflict("a running task's start cannot be moved".to_string()));
        }

        self.check_feasibility(request, Some(task_id))?;

        let snapshot = {
            let mut task = handle.write().expect("RwLock poisoned");
            task.name = request.name.clone();
            task.description = request.description.clone();
            task.start_time = request.start_time;
            task.end_time = request.end_time;
            task.allocations = request.allocations.clone();
            task.clone()
        };

        self.store.rewrite_boundary_events(task_id, request.start_time, request.end_time);

        log::info!("Rescheduled task '{}' to {} - {}.", request.name, request.start_time, request.end_time);

        Ok(Some(AdmittedTask { id: task_id, task: snapshot }))
    }

    /// Removes a task on behalf of its owner, cascading its allocations
    /// and events, and releases the owner's alert thresholds.
    pub fn remove(&self, task_id: TaskId, owner: &UserId) -> Result<Task> {
        let removed = {
            let _gate = self.store.admission_lock();

            let handle = self.store.get_task(task_id).ok_or_else(|| Error::NotFound("Task".to_string()))?;
            if handle.read().expect("RwLock poisoned").owner != *owner {
                return Err(Error::PermissionDenied);
            }

            self.store.remove_task(task_id).ok_or_else(|| Error::NotFound("Task".to_string()))?
        };

        log::info!("Removed task '{}' together with its events.", removed.name);

        let now = self.clock.now();
        let profile = allocation_profile(&self.store, owner, now);
        let errors = self.alert_sync.sync_user_alerts(owner, now, &profile);
        if !errors.is_empty() {
            log::error!("Errors occurred when updating alerts for user '{}' after removal!", owner);
        }
        self.wakeup.poke();

        Ok(removed)
    }

    /// Post-commit side effects. All of them run on already-committed data
    /// with no store lock held, and none of them can undo the admission.
    fn after_commit(&self, admitted: &AdmittedTask) {
        if let Err(e) = self.notifications.reschedule_for_task(admitted.id) {
            log::error!("Notification planning failed for task '{}': {}", admitted.task.name, e);
        }

        let now = self.clock.now();
        let profile = allocation_profile(&self.store, &admitted.task.owner, now);
        let errors = self.alert_sync.sync_user_alerts(&admitted.task.owner, now, &profile);
        if !errors.is_empty() {
            log::error!("Errors occurred when updating alerts for user '{}' after admission!", admitted.task.owner);
        }

        // A new earlier event may now exist.
        self.wakeup.poke();
    }
}
