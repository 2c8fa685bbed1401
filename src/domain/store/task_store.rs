use chrono::{DateTime, Utc};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::domain::event::{Event, EventType};
use crate::domain::id::UserId;
use crate::domain::task::Task;

new_key_type! {
    pub struct TaskId;
    pub struct EventId;
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Task rows. Each row carries its own lock; mutating a task's status
    /// or schedule takes the row lock, not the table lock.
    tasks: SlotMap<TaskId, Arc<RwLock<Task>>>,

    /// Event rows, same layout as tasks.
    events: SlotMap<EventId, Arc<RwLock<Event>>>,

    /// Which events belong to which task, for cascade deletes and rewrites.
    task_events: SecondaryMap<TaskId, Vec<EventId>>,
}

/// In-memory table of tasks and their events.
///
/// Lock order is always table-then-row, and no lock is ever held across a
/// call into an external collaborator.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<StoreInner>>,

    /// Serializes scheduling decisions. Holding this guard is the
    /// in-memory equivalent of exclusively locking the candidate row and
    /// every overlapping row for the duration of the decision and write,
    /// so two concurrent admissions can never both observe stale capacity.
    admission_gate: Arc<Mutex<()>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the admission gate for the duration of one scheduling decision.
    pub fn admission_lock(&self) -> MutexGuard<'_, ()> {
        self.admission_gate.lock().expect("Mutex poisoned")
    }

    //--------------------
    // --- Task Methods ---
    //--------------------

    pub fn insert_task(&self, task: Task) -> TaskId {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        let id = guard.tasks.insert(Arc::new(RwLock::new(task)));
        guard.task_events.insert(id, Vec::new());
        id
    }

    pub fn get_task(&self, id: TaskId) -> Option<Arc<RwLock<Task>>> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.tasks.get(id).cloned()
    }

    /// Removes a task together with all of its events.
    pub fn remove_task(&self, id: TaskId) -> Option<Task> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        let handle = guard.tasks.remove(id)?;
        if let Some(event_ids) = guard.task_events.remove(id) {
            for event_id in event_ids {
                guard.events.remove(event_id);
            }
        }
        let task = handle.read().expect("RwLock poisoned").clone();
        Some(task)
    }

    pub fn task_count(&self) -> usize {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.tasks.len()
    }

    /// All scheduled/running tasks whose interval strictly overlaps
    /// [`start`, `end`), optionally excluding one task (the candidate's own
    /// prior version during an update, or a timeline preview exclusion).
    pub fn active_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<TaskId>,
    ) -> Vec<(TaskId, Arc<RwLock<Task>>)> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard
            .tasks
            .iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .filter(|(_, handle)| {
                let task = handle.read().expect("RwLock poisoned");
                task.is_active() && task.overlaps(start, end)
            })
            .map(|(id, handle)| (id, handle.clone()))
            .collect()
    }

    /// The user's tasks that count towards their alert thresholds at `at`:
    /// scheduled or running, and started (or starting) by that instant.
    pub fn active_tasks_for_user(&self, owner: &UserId, at: DateTime<Utc>) -> Vec<(TaskId, Arc<RwLock<Task>>)> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard
            .tasks
            .iter()
            .filter(|(_, handle)| {
                let task = handle.read().expect("RwLock poisoned");
                task.is_active() && task.owner == *owner && task.start_time <= at
            })
            .map(|(id, handle)| (id, handle.clone()))
            .collect()
    }

    //---------------------
    // --- Event Methods ---
    //---------------------

    pub fn insert_event(&self, event: Event) -> EventId {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        let task_id = event.task;
        let id = guard.events.insert(Arc::new(RwLock::new(event)));
        guard.task_events.entry(task_id).expect("task row gone").or_insert_with(Vec::new).push(id);
        id
    }

    pub fn get_event(&self, id: EventId) -> Option<Arc<RwLock<Event>>> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.events.get(id).cloned()
    }

    pub fn remove_event(&self, id: EventId) -> Option<Event> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        let handle = guard.events.remove(id)?;
        let event = handle.read().expect("RwLock poisoned").clone();
        if let Some(event_ids) = guard.task_events.get_mut(event.task) {
            event_ids.retain(|existing| *existing != id);
        }
        Some(event)
    }

    pub fn events_for_task(&self, task: TaskId) -> Vec<(EventId, Arc<RwLock<Event>>)> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard
            .task_events
            .get(task)
            .map(|event_ids| {
                event_ids.iter().filter_map(|id| guard.events.get(*id).map(|handle| (*id, handle.clone()))).collect()
            })
            .unwrap_or_default()
    }

    /// Rewrites the task's start/end event times in place. Used when a task
    /// is rescheduled so the pending events track the new boundaries.
    pub fn rewrite_boundary_events(&self, task: TaskId, start: DateTime<Utc>, end: DateTime<Utc>) {
        for (_, handle) in self.events_for_task(task) {
            let mut event = handle.write().expect("RwLock poisoned");
            match event.event_type {
                EventType::TaskStart => event.time = start,
                EventType::TaskEnd => event.time = end,
                EventType::Other => {}
            }
        }
    }

    /// All events due at or before `cutoff`, ordered by time. Returned as
    /// snapshots together with their row handles; the caller processes them
    /// in this order.
    pub fn due_events(&self, cutoff: DateTime<Utc>) -> Vec<(EventId, Event)> {
        let guard = self.inner.read().expect("RwLock poisoned");
        let mut due: Vec<(EventId, Event)> = guard
            .events
            .iter()
            .filter_map(|(id, handle)| {
                let event = handle.read().expect("RwLock poisoned");
                if event.time <= cutoff { Some((id, event.clone())) } else { None }
            })
            .collect();
        due.sort_by_key(|(_, event)| event.time);
        due
    }

    /// The earliest pending event time, for computing the next wake-up.
    pub fn next_event_time(&self) -> Option<DateTime<Utc>> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.events.values().map(|handle| handle.read().expect("RwLock poisoned").time).min()
    }

    pub fn event_count(&self) -> usize {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.events.len()
    }
}
