use chrono::{DateTime, Duration, Utc};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::config::Settings;
use crate::domain::clock::SharedClock;
use crate::domain::directory::Directory;
use crate::domain::event::{Event, EventType};
use crate::domain::id::UserId;
use crate::domain::mailer::{MailDispatch, RenderedNotification};
use crate::domain::monitoring::{AlertSync, allocation_profile};
use crate::domain::notification::render_template;
use crate::domain::store::task_store::{EventId, TaskStore};
use crate::domain::task::TaskStatus;

/// Where the processor currently is in its wake-up cycle.
///
/// There is exactly one outstanding wake-up at any time. Whenever new,
/// earlier-due work appears the pending wake-up is replaced wholesale
/// (cancel-then-re-arm); arming while armed is a benign race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// No events exist; waiting to be poked.
    Idle,
    /// A wake-up is scheduled for the contained instant.
    Armed(DateTime<Utc>),
    /// Currently draining due events.
    Running,
}

/// Handle used to tell the processor that an earlier event may now exist.
/// Cloned freely; the admission scheduler pokes it after every commit.
#[derive(Debug, Clone, Default)]
pub struct WakeupSignal {
    notify: Arc<Notify>,
}

impl WakeupSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poke(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// What one wake-up accomplished. Mostly useful for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub transitions: usize,
    pub notifications_fired: usize,
}

/// The singleton background worker that drains due events.
///
/// Per wake-up it applies all task status transitions first, then fires
/// notifications, then re-synchronizes alert thresholds per affected user,
/// and finally re-arms for the next-soonest event. An internal failure
/// aborts the remaining work of that wake-up and re-arms after the
/// configured retry backoff; the loop itself never terminates.
#[derive(Debug)]
pub struct EventProcessor {
    store: TaskStore,
    directory: Directory,
    mail: Arc<dyn MailDispatch>,
    alert_sync: Arc<dyn AlertSync>,
    clock: SharedClock,
    settings: Settings,
    wakeup: WakeupSignal,
    state: Mutex<ProcessorState>,
}

impl EventProcessor {
    pub fn new(
        store: TaskStore,
        directory: Directory,
        mail: Arc<dyn MailDispatch>,
        alert_sync: Arc<dyn AlertSync>,
        clock: SharedClock,
        settings: Settings,
        wakeup: WakeupSignal,
    ) -> Self {
        Self { store, directory, mail, alert_sync, clock, settings, wakeup, state: Mutex::new(ProcessorState::Idle) }
    }

    pub fn wakeup_signal(&self) -> WakeupSignal {
        self.wakeup.clone()
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.lock().expect("Mutex poisoned")
    }

    fn set_state(&self, state: ProcessorState) {
        *self.state.lock().expect("Mutex poisoned") = state;
    }

    /// The wake-up loop. Runs until the owning task is aborted.
    pub async fn run(&self) {
        log::info!("Timed event processor started.");

        let mut retry_at: Option<DateTime<Utc>> = None;

        loop {
            let now = self.clock.now();
            let deadline = compute_deadline(self.store.next_event_time(), retry_at.take(), now, &self.settings);

            let deadline = match deadline {
                Some(deadline) => deadline,
                None => {
                    self.set_state(ProcessorState::Idle);
                    self.wakeup.notified().await;
                    continue;
                }
            };

            self.set_state(ProcessorState::Armed(deadline));
            let delay = (deadline - self.clock.now()).to_std().unwrap_or(std::time::Duration::ZERO);

            tokio::select! {
                // New earlier-due work may exist: cancel and re-arm.
                _ = self.wakeup.notified() => {}

                _ = tokio::time::sleep(delay) => {
                    self.set_state(ProcessorState::Running);

                    let timepoint = self.clock.now() + Duration::seconds(self.settings.event_precision_seconds);
                    let outcome = catch_unwind(AssertUnwindSafe(|| self.drain_due_events(timepoint)));

                    match outcome {
                        Ok(summary) => {
                            log::debug!(
                                "Wake-up done: {} transition(s), {} notification(s).",
                                summary.transitions,
                                summary.notifications_fired
                            );
                        }
                        Err(_) => {
                            log::error!(
                                "Event processing failed, retrying in {} second(s).",
                                self.settings.retry_backoff_seconds
                            );
                            retry_at = Some(self.clock.now() + Duration::seconds(self.settings.retry_backoff_seconds));
                        }
                    }
                }
            }
        }
    }

    /// Drains every event due at or before `timepoint`, in time order.
    ///
    /// Status transitions are applied before any alert re-sync so the sync
    /// always sees post-transition task state. Exposed for deterministic
    /// testing; the loop calls it once per wake-up.
    pub fn drain_due_events(&self, timepoint: DateTime<Utc>) -> DrainSummary {
        let due = self.store.due_events(timepoint);
        log::debug!("Processing {} scheduled event(s) due by {}.", due.len(), timepoint);

        let mut summary = DrainSummary::default();
        let mut affected_users: Vec<UserId> = Vec::new();
        let mut transitioned: Vec<(EventId, UserId)> = Vec::new();

        for (event_id, event) in due {
            match event.event_type {
                EventType::TaskStart | EventType::TaskEnd => {
                    if let Some(owner) = self.apply_transition(&event, timepoint) {
                        if !affected_users.contains(&owner) {
                            affected_users.push(owner.clone());
                        }
                        transitioned.push((event_id, owner));
                        summary.transitions += 1;
                    }
                }
                EventType::Other => {
                    self.fire_notification(&event);
                    self.store.remove_event(event_id);
                    summary.notifications_fired += 1;
                }
            }
        }

        for user in &affected_users {
            // Locked re-read so the sync sees a consistent snapshot even if
            // another admission just landed concurrently.
            let profile = allocation_profile(&self.store, user, timepoint);
            let errors = self.alert_sync.sync_user_alerts(user, timepoint, &profile);
            if !errors.is_empty() {
                log::error!("Errors have occurred when updating alerts for user '{}'!", user);
                for error in &errors {
                    log::debug!("Alert sync error for '{}': {}", user, error);
                }
            }

            // The consumed start/end events go away regardless of sync
            // errors; task status already advanced and is the source of
            // truth.
            for (event_id, owner) in &transitioned {
                if owner == user {
                    self.store.remove_event(*event_id);
                }
            }
        }

        summary
    }

    /// Flips the owning task's status if the event still matches the task's
    /// current schedule. An event whose task was rescheduled to a later
    /// instant is skipped without side effect; the rewritten event row
    /// fires it again once the new boundary is due.
    fn apply_transition(&self, event: &Event, timepoint: DateTime<Utc>) -> Option<UserId> {
        let handle = match self.store.get_task(event.task) {
            Some(handle) => handle,
            None => {
                log::warn!("Event '{}' references a task row that is gone, dropping it.", event.name);
                return None;
            }
        };

        let mut task = handle.write().expect("RwLock poisoned");

        match event.event_type {
            EventType::TaskStart if task.status == TaskStatus::Scheduled && task.start_time <= timepoint => {
                task.status = TaskStatus::Running;
                log::info!("Task '{}' started.", task.name);
                Some(task.owner.clone())
            }
            EventType::TaskEnd if task.status != TaskStatus::Finished && task.end_time <= timepoint => {
                task.status = TaskStatus::Finished;
                log::info!("Task '{}' finished.", task.name);
                Some(task.owner.clone())
            }
            _ => None,
        }
    }

    /// Renders and dispatches a one-shot notification. Best effort: a
    /// delivery failure is logged, never retried.
    fn fire_notification(&self, event: &Event) {
        let notification = match &event.notification {
            Some(id) => match self.directory.notification(id) {
                Some(notification) => notification,
                None => {
                    log::warn!("Event '{}' references unknown notification, dropping it.", event.name);
                    return;
                }
            },
            None => {
                log::warn!("Event '{}' has no notification reference, dropping it.", event.name);
                return;
            }
        };

        let task = match self.store.get_task(event.task) {
            Some(handle) => handle.read().expect("RwLock poisoned").clone(),
            None => {
                log::warn!("Event '{}' references a task row that is gone, dropping it.", event.name);
                return;
            }
        };

        let user = match self.directory.user(&task.owner) {
            Some(user) => user,
            None => {
                log::warn!("Task '{}' is owned by unknown user '{}', notification dropped.", task.name, task.owner);
                return;
            }
        };

        let body = render_template(notification.template.as_deref().unwrap_or_default(), &user, &task);
        let mail = RenderedNotification { recipient: user.email.clone(), subject: notification.id.to_string(), body };

        if let Err(error) = self.mail.send(&mail) {
            log::error!("Error sending notification '{}' to {}: {}", notification.id, user.email, error);
        }
    }
}

/// Picks the next wake-up instant.
///
/// A pending retry wins outright. Otherwise the next event time is used,
/// clamped to at least `min_rearm_delay_seconds` from now; with no events
/// at all the processor goes idle.
pub fn compute_deadline(
    next_event: Option<DateTime<Utc>>,
    retry_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    settings: &Settings,
) -> Option<DateTime<Utc>> {
    if let Some(retry_at) = retry_at {
        return Some(retry_at);
    }

    let next_event = next_event?;
    let floor = now + Duration::seconds(settings.min_rearm_delay_seconds);
    Some(next_event.max(floor))
}
