use chrono::Duration;

use crate::domain::directory::{Directory, User};
use crate::domain::event::{Event, EventType};
use crate::domain::id::NotificationId;
use crate::domain::store::task_store::{TaskId, TaskStore};
use crate::domain::task::{Task, TaskStatus};
use crate::error::Result;

/// Which task boundary a notification is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Fires relative to the task's start time.
    TaskStart,
    /// Fires relative to the task's end time.
    TaskEnd,
    /// Not tied to a task boundary; never planned automatically.
    Other,
}

/// A user-subscribable message fired by the timed event processor.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: NotificationId,
    pub description: Option<String>,
    pub kind: NotificationKind,
    /// Signed offset in seconds from the anchoring task boundary.
    pub time_offset_seconds: i64,
    /// Message body with `$placeholder` substitution, see [`render_template`].
    pub template: Option<String>,
}

/// Renders a notification template against a user and a task.
///
/// Supported placeholders (written as `$key` or `${key}`): `user_name`,
/// `user_surname`, `user_username`, `user_email`, `task_uuid`, `task_name`,
/// `task_description`, `task_start`, `task_end`. Unknown placeholders are
/// left untouched.
pub fn render_template(template: &str, user: &User, task: &Task) -> String {
    let substitutions: Vec<(&str, String)> = vec![
        ("user_username", user.username.to_string()),
        ("user_surname", user.surname.clone().unwrap_or_default()),
        ("user_name", user.name.clone().unwrap_or_default()),
        ("user_email", user.email.clone()),
        ("task_description", task.description.clone().unwrap_or_default()),
        ("task_start", task.start_time.to_rfc3339()),
        ("task_uuid", task.uuid.to_string()),
        ("task_name", task.name.clone()),
        ("task_end", task.end_time.to_rfc3339()),
    ];

    // Longer keys first so `$user_username` is never clobbered by `$user_name`.
    let mut ordered = substitutions;
    ordered.sort_by_key(|(key, _)| std::cmp::Reverse(key.len()));

    let mut rendered = template.to_string();
    for (key, value) in &ordered {
        rendered = rendered.replace(&format!("${{{}}}", key), value);
        rendered = rendered.replace(&format!("${}", key), value);
    }
    rendered
}

/// Recomputes the fire-once notification events tied to a task whenever its
/// schedule changes. Invoked by the admission scheduler after a successful
/// write.
pub trait NotificationScheduler: std::fmt::Debug + Send + Sync {
    fn reschedule_for_task(&self, task_id: TaskId) -> Result<()>;
}

/// Plans notification events from the owner's subscriptions (direct ones
/// plus everything inherited along the ancestor group chain).
#[derive(Debug, Clone)]
pub struct SubscriptionNotificationScheduler {
    store: TaskStore,
    directory: Directory,
}

impl SubscriptionNotificationScheduler {
    pub fn new(store: TaskStore, directory: Directory) -> Self {
        Self { store, directory }
    }

    /// Upserts the event for one (task, notification) pair.
    /// Never creates a duplicate row for a pair that already has one.
    fn plan_notification(&self, task_id: TaskId, task: &Task, notification: &Notification) {
        let anchor = match notification.kind {
            NotificationKind::TaskStart => {
                // A task that already started does not announce its start.
                if task.status != TaskStatus::Scheduled {
                    return;
                }
                task.start_time
            }
            NotificationKind::TaskEnd => {
                if task.status == TaskStatus::Finished {
                    return;
                }
                task.end_time
            }
            NotificationKind::Other => return,
        };

        let fire_at = anchor + Duration::seconds(notification.time_offset_seconds);

        let existing = self.store.events_for_task(task_id).into_iter().find(|(_, handle)| {
            let event = handle.read().expect("RwLock poisoned");
            event.event_type == EventType::Other && event.notification.as_ref() == Some(&notification.id)
        });

        match existing {
            Some((_, handle)) => {
                let mut event = handle.write().expect("RwLock poisoned");
                if event.time != fire_at {
                    event.time = fire_at;
                }
            }
            None => {
                self.store.insert_event(Event::notification(&task.name, task_id, notification.id.clone(), fire_at));
            }
        }
    }
}

impl NotificationScheduler for SubscriptionNotificationScheduler {
    fn reschedule_for_task(&self, task_id: TaskId) -> Result<()> {
        let handle = match self.store.get_task(task_id) {
            Some(handle) => handle,
            None => {
                log::warn!("Notification planning skipped, task row {:?} is gone.", task_id);
                return Ok(());
            }
        };
        let task = handle.read().expect("RwLock poisoned").clone();

        for notification in self.directory.subscribed_notifications(&task.owner) {
            self.plan_notification(task_id, &task, &notification);
        }

        Ok(())
    }
}
