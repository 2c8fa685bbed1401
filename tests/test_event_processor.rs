//! Drives the background event processor loop end to end with a mock
//! clock: task lifecycle transitions, re-arming on admission, and survival
//! of an internal failure.


use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use clock_mock::MockClock;
use resbook::config::Settings;
use resbook::domain::directory::{Directory, Group, Node, ResourceInfo, ResourceUnit, User};
use resbook::domain::id::UserId;
use resbook::domain::mailer::LogMailer;
use resbook::domain::monitoring::{AlertSync, AllocationProfile, LogAlertSync, SyncError};
use resbook::domain::notification::SubscriptionNotificationScheduler;
use resbook::domain::processor::{EventProcessor, ProcessorState, WakeupSignal};
use resbook::domain::scheduler::{AdmissionScheduler, TaskRequest};
use resbook::domain::store::task_store::{TaskId, TaskStore};
use resbook::domain::task::{ResourceAllocation, TaskStatus};

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
}

fn directory() -> Directory {
    let directory = Directory::new();
    directory.add_resource(ResourceInfo { id: "cpu".into(), description: None, unit: ResourceUnit::None });
    directory
        .add_node(Node { id: "a".into(), description: None, provides: [("cpu".into(), 4)].into_iter().collect() })
        .unwrap();
    directory.add_group(Group { id: "users".into(), description: None, parent: None, subscriptions: vec![] }).unwrap();
    directory
        .add_user(User {
            username: "u".into(),
            name: None,
            surname: None,
            email: "u@example.org".to_string(),
            group: "users".into(),
            subscriptions: vec![],
        })
        .unwrap();
    directory
}

/// Immediate wake-ups, short backoff: the loop reacts within the test's
/// paused-time budget.
fn settings() -> Settings {
    Settings { event_precision_seconds: 5, retry_backoff_seconds: 30, min_rearm_delay_seconds: 0, ..Settings::default() }
}

struct Stack {
    store: TaskStore,
    scheduler: AdmissionScheduler,
    processor: Arc<EventProcessor>,
    clock: MockClock,
    wakeup: WakeupSignal,
}

fn stack_with_alert_sync(alert_sync: Arc<dyn AlertSync>) -> Stack {
    let directory = directory();
    let clock = MockClock::starting_at(at(10));
    let store = TaskStore::new();
    let wakeup = WakeupSignal::new();

    let scheduler = AdmissionScheduler::new(
        store.clone(),
        Arc::new(directory.clone()),
        Arc::new(directory.clone()),
        Arc::new(SubscriptionNotificationScheduler::new(store.clone(), directory.clone())),
        Arc::new(LogAlertSync),
        wakeup.clone(),
        clock.shared(),
    );

    let processor = Arc::new(EventProcessor::new(
        store.clone(),
        directory,
        Arc::new(LogMailer::default()),
        alert_sync,
        clock.shared(),
        settings(),
        wakeup.clone(),
    ));

    Stack { store, scheduler, processor, clock, wakeup }
}

fn booking(name: &str, start: u32, end: u32) -> TaskRequest {
    TaskRequest {
        task: None,
        name: name.to_string(),
        description: None,
        start_time: at(start),
        end_time: at(end),
        allocations: vec![ResourceAllocation::new("a", "cpu", 1)],
    }
}

fn owner() -> UserId {
    "u".into()
}

fn status_of(store: &TaskStore, id: TaskId) -> TaskStatus {
    store.get_task(id).unwrap().read().unwrap().status
}

/// Polls until `predicate` holds, yielding to the runtime in between.
async fn wait_until(what: &str, predicate: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if predicate() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    panic!("timed out waiting until {}", what);
}

#[tokio::test(start_paused = true)]
async fn processor_drives_the_full_task_lifecycle() {
    let stack = stack_with_alert_sync(Arc::new(LogAlertSync));
    let processor = stack.processor.clone();
    let worker = tokio::spawn(async move { processor.run().await });

    // Admission pokes the processor out of idle; the start is already due.
    let admitted = stack.scheduler.schedule(booking("batch", 10, 12), &owner()).unwrap();
    wait_until("the task is running", || status_of(&stack.store, admitted.id) == TaskStatus::Running).await;

    // The consumed start event is gone, the end event is still pending.
    assert_eq!(stack.store.event_count(), 1);

    // Jump past the end boundary and let the next wake-up finish it.
    stack.clock.set(at(12));
    stack.wakeup.poke();
    wait_until("the task is finished", || status_of(&stack.store, admitted.id) == TaskStatus::Finished).await;

    wait_until("all events are consumed", || stack.store.event_count() == 0).await;
    wait_until("the processor goes idle", || stack.processor.state() == ProcessorState::Idle).await;

    worker.abort();
}

#[tokio::test(start_paused = true)]
async fn status_never_moves_backwards() {
    let stack = stack_with_alert_sync(Arc::new(LogAlertSync));
    let processor = stack.processor.clone();
    let worker = tokio::spawn(async move { processor.run().await });

    stack.clock.set(at(13));
    let admitted = stack.scheduler.schedule(booking("late", 10, 12), &owner()).unwrap();

    // Start and end are both overdue; the drain applies them in time order
    // and the task ends up finished, never scheduled again.
    wait_until("the task is finished", || status_of(&stack.store, admitted.id) == TaskStatus::Finished).await;
    wait_until("all events are consumed", || stack.store.event_count() == 0).await;
    assert_eq!(status_of(&stack.store, admitted.id), TaskStatus::Finished);

    worker.abort();
}

/// An alert sync that panics exactly once, simulating a transient
/// downstream outage during a wake-up.
#[derive(Debug, Default)]
struct PanicOnceAlertSync {
    tripped: AtomicBool,
    calls: AtomicUsize,
}

impl AlertSync for PanicOnceAlertSync {
    fn sync_user_alerts(&self, _user: &UserId, _as_of: DateTime<Utc>, _profile: &AllocationProfile) -> Vec<SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.tripped.swap(true, Ordering::SeqCst) {
            panic!("monitoring backend unavailable");
        }
        Vec::new()
    }
}

#[tokio::test(start_paused = true)]
async fn internal_failure_rearms_instead_of_killing_the_loop() {
    let alert_sync = Arc::new(PanicOnceAlertSync::default());
    let stack = stack_with_alert_sync(alert_sync.clone());
    let processor = stack.processor.clone();
    let worker = tokio::spawn(async move { processor.run().await });

    // First wake-up: the transition applies, then the alert sync panics.
    let first = stack.scheduler.schedule(booking("one", 10, 12), &owner()).unwrap();
    wait_until("the failing sync was attempted", || alert_sync.calls.load(Ordering::SeqCst) >= 1).await;
    wait_until("the task still went running", || status_of(&stack.store, first.id) == TaskStatus::Running).await;

    // The loop survived and keeps processing new work after the backoff.
    let second = stack.scheduler.schedule(booking("two", 10, 12), &owner()).unwrap();
    wait_until("the loop still processes events", || status_of(&stack.store, second.id) == TaskStatus::Running).await;
    assert!(alert_sync.calls.load(Ordering::SeqCst) >= 2);

    worker.abort();
}
