use chrono::{DateTime, Utc};

use crate::domain::id::NotificationId;
use crate::domain::store::task_store::TaskId;

/// What the processor has to do when an event comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Flip the owning task to `Running`.
    TaskStart,
    /// Flip the owning task to `Finished`.
    TaskEnd,
    /// Fire a one-shot user notification, then delete the event.
    Other,
}

/// A scheduled future instant at which the timed event processor must act.
///
/// Start/end events are created together with their task and are rewritten
/// in place when the task is rescheduled. `Other` events reference the
/// notification they fire and are deleted once processed.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub time: DateTime<Utc>,
    pub event_type: EventType,
    pub task: TaskId,
    pub notification: Option<NotificationId>,
}

impl Event {
    pub fn task_start(task_name: &str, task: TaskId, time: DateTime<Utc>) -> Self {
        Self { name: format!("{} start", task_name), time, event_type: EventType::TaskStart, task, notification: None }
    }

    pub fn task_end(task_name: &str, task: TaskId, time: DateTime<Utc>) -> Self {
        Self { name: format!("{} end", task_name), time, event_type: EventType::TaskEnd, task, notification: None }
    }

    pub fn notification(task_name: &str, task: TaskId, notification: NotificationId, time: DateTime<Utc>) -> Self {
        Self {
            name: format!("Task: {}, notification: {}", task_name, notification),
            time,
            event_type: EventType::Other,
            task,
            notification: Some(notification),
        }
    }
}
