//! End-to-end admission scenarios driven through the public API: a system
//! model parsed from JSON, a directory built from it, and bookings pushed
//! through the admission scheduler.

use std::sync::Arc;

use resbook::api::model_dto::SystemModelDto;
use resbook::domain::clock::SharedClock;
use resbook::domain::directory::{Directory, NodeCapacityProvider};
use resbook::domain::id::UserId;
use resbook::domain::monitoring::LogAlertSync;
use resbook::domain::notification::SubscriptionNotificationScheduler;
use resbook::domain::processor::WakeupSignal;
use resbook::domain::scheduler::{AdmissionScheduler, TaskRequest};
use resbook::domain::store::task_store::TaskStore;
use resbook::domain::task::ResourceAllocation;
use resbook::error::Error;

const MODEL: &str = r#"
{
    "resources": [
        { "name": "cpu", "description": "CPU cores" },
        { "name": "gpu", "description": "GPU devices" }
    ],
    "nodes": [
        { "name": "a", "resources": [ { "resource": "cpu", "amount": 4 } ] },
        { "name": "b", "resources": [ { "resource": "gpu", "amount": 8 } ] }
    ],
    "groups": [
        { "name": "research", "parent": "users" },
        { "name": "users", "parent": null }
    ],
    "users": [
        { "username": "u", "email": "u@example.org", "group": "research" }
    ],
    "limits": [
        { "name": "research-gpu", "group": "research", "resource": "gpu", "nodes": ["b"], "amount": 2 },
        { "name": "everyone-gpu", "group": "users", "resource": "gpu", "nodes": ["b"], "amount": 6 }
    ]
}
"#;

fn build_stack() -> (TaskStore, AdmissionScheduler) {
    let dto: SystemModelDto = serde_json::from_str(MODEL).expect("model JSON is valid");
    let directory = Directory::from_dto(&dto).expect("model is consistent");

    let store = TaskStore::new();
    let scheduler = AdmissionScheduler::new(
        store.clone(),
        Arc::new(directory.clone()),
        Arc::new(directory.clone()),
        Arc::new(SubscriptionNotificationScheduler::new(store.clone(), directory.clone())),
        Arc::new(LogAlertSync),
        WakeupSignal::new(),
        SharedClock::default(),
    );
    (store, scheduler)
}

fn booking(name: &str, start_hour: u32, end_hour: u32, node: &str, resource: &str, amount: i64) -> TaskRequest {
    use chrono::TimeZone;
    TaskRequest {
        task: None,
        name: name.to_string(),
        description: None,
        start_time: chrono::Utc.with_ymd_and_hms(2026, 3, 1, start_hour, 0, 0).unwrap(),
        end_time: chrono::Utc.with_ymd_and_hms(2026, 3, 1, end_hour, 0, 0).unwrap(),
        allocations: vec![ResourceAllocation::new(node, resource, amount)],
    }
}

fn owner() -> UserId {
    "u".into()
}

/// Node `a` provides 4 cpu. T1 [10:00-12:00) takes 3, so T2 [11:00-13:00)
/// asking for 2 must fail (3+2=5 > 4 during the overlap), while T3
/// [12:00-13:00) asking for 2 fits.
#[test]
fn capacity_scenario_from_the_specification() {
    let (store, scheduler) = build_stack();

    scheduler.schedule(booking("t1", 10, 12, "a", "cpu", 3), &owner()).expect("t1 fits alone");

    let rejected = scheduler.schedule(booking("t2", 11, 13, "a", "cpu", 2), &owner());
    assert!(matches!(rejected, Err(Error::CapacityExceeded { .. })), "t2 must collide during [11:00, 12:00)");

    scheduler.schedule(booking("t3", 12, 13, "a", "cpu", 2), &owner()).expect("t3 starts when t1 ends");

    // Two admitted tasks, each with its start and end event.
    assert_eq!(store.task_count(), 2);
    assert_eq!(store.event_count(), 4);
}

/// The user's effective gpu limit on node `b` is 2 (the child group's limit
/// overrides the parent's 6), so a request for 3 is rejected before any
/// capacity check.
#[test]
fn limit_scenario_from_the_specification() {
    let (store, scheduler) = build_stack();

    let rejected = scheduler.schedule(booking("t", 10, 12, "b", "gpu", 3), &owner());
    match rejected {
        Err(Error::LimitExceeded { resource, node, requested, limit }) => {
            assert_eq!(resource, "gpu".into());
            assert_eq!(node, "b".into());
            assert_eq!(requested, 3);
            assert_eq!(limit, 2);
        }
        other => panic!("expected LimitExceeded, got {:?}", other.map(|a| a.task.name)),
    }
    assert_eq!(store.task_count(), 0);

    scheduler.schedule(booking("t", 10, 12, "b", "gpu", 2), &owner()).expect("at the limit is fine");
}

#[test]
fn model_files_load_through_the_loader() {
    let path = std::env::temp_dir().join(format!("resbook-model-{}.json", std::process::id()));
    std::fs::write(&path, MODEL).unwrap();

    let (directory, dto) = resbook::load_system_model(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(dto.nodes.len(), 2);
    assert!(directory.user(&owner()).is_some());
    assert_eq!(directory.capacity(&"a".into(), &"cpu".into()), Some(4));
}

#[test]
fn missing_parent_group_fails_model_construction() {
    let broken: SystemModelDto =
        serde_json::from_str(r#"{ "groups": [ { "name": "child", "parent": "nope" } ] }"#).unwrap();
    assert!(matches!(Directory::from_dto(&broken), Err(Error::NotFound(_))));
}
