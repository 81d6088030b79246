// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sw_core::{
    AuthenticationStatus, FakeClock, ScanRequest, ScanType, TraceId,
};

fn manager(dir: &std::path::Path, clock: FakeClock) -> TaskManager<FakeClock> {
    TaskManager::new(TaskStore::open(dir).unwrap(), clock)
}

fn config(id: &str, pool: &str, targets: &str) -> TaskConfig {
    TaskConfig {
        id: TaskId::new(id),
        trace_id: TraceId::new("trace"),
        pool: pool.to_string(),
        scan_type: ScanType::Untrusted,
        request: ScanRequest {
            targets: targets.to_string(),
            name: "s".to_string(),
            description: None,
            credentials: None,
            profile: None,
            custom_fields: None,
        },
    }
}

fn valid() -> Validation {
    Validation {
        is_valid: true,
        authentication_status: AuthenticationStatus::NotApplicable,
        warnings: Vec::new(),
        stats: None,
    }
}

#[test]
fn create_then_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::at(1_000);
    let manager = manager(dir.path(), clock.clone());

    let task = manager.create(config("p-t1", "p", "10.0.0.1")).unwrap();
    assert_eq!(task.state, TaskState::Queued);

    clock.advance(500);
    let running = manager.mark_running(&task.id).unwrap();
    assert_eq!(running.state, TaskState::Running);
    assert_eq!(running.started_at_ms, Some(1_500));

    manager.set_instance(&task.id, "scanner-01").unwrap();
    manager.set_scanner_scan_id(&task.id, 77).unwrap();

    clock.advance(500);
    let done = manager.mark_completed(&task.id, valid()).unwrap();
    assert_eq!(done.state, TaskState::Completed);
    assert_eq!(done.completed_at_ms, Some(2_000));
    assert_eq!(done.instance.as_deref(), Some("scanner-01"));
    assert_eq!(done.scanner_scan_id, Some(77));
    assert!(done.validation.unwrap().is_valid);
}

#[test]
fn illegal_transition_is_rejected_and_does_not_mutate() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), FakeClock::at(0));
    let task = manager.create(config("p-t1", "p", "10.0.0.1")).unwrap();

    // queued -> completed skips running
    assert!(matches!(
        manager.mark_completed(&task.id, valid()),
        Err(StoreError::IllegalTransition(_))
    ));
    let (read, _) = manager.get(&task.id).unwrap();
    assert_eq!(read.state, TaskState::Queued);
    assert!(read.validation.is_none());
}

#[test]
fn queued_task_can_fail_directly() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), FakeClock::at(0));
    let task = manager.create(config("p-t1", "p", "10.0.0.1")).unwrap();

    let failed = manager.mark_failed(&task.id, "unknown pool", None).unwrap();
    assert_eq!(failed.state, TaskState::Failed);
    assert_eq!(failed.error.as_deref(), Some("unknown pool"));
}

#[test]
fn timeout_annotates_error() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), FakeClock::at(0));
    let task = manager.create(config("p-t1", "p", "10.0.0.1")).unwrap();
    manager.mark_running(&task.id).unwrap();

    let timed_out = manager.mark_timeout(&task.id).unwrap();
    assert_eq!(timed_out.state, TaskState::Timeout);
    assert_eq!(timed_out.error.as_deref(), Some("scan deadline exceeded"));
}

#[test]
fn progress_overlay_is_transient_and_running_only() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), FakeClock::at(0));
    let task = manager.create(config("p-t1", "p", "10.0.0.1")).unwrap();

    manager.update_progress(&task.id, 40);
    let (_, progress) = manager.get(&task.id).unwrap();
    assert_eq!(progress, None, "progress hidden while queued");

    manager.mark_running(&task.id).unwrap();
    manager.update_progress(&task.id, 130);
    let (_, progress) = manager.get(&task.id).unwrap();
    assert_eq!(progress, Some(100), "clamped to 100");

    manager.mark_completed(&task.id, valid()).unwrap();
    let (_, progress) = manager.get(&task.id).unwrap();
    assert_eq!(progress, None, "dropped at terminal transition");
}

#[test]
fn list_filters_by_status_pool_and_target() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::at(1_000);
    let manager = manager(dir.path(), clock.clone());

    manager.create(config("a-1", "a", "10.0.0.0/24")).unwrap();
    clock.advance(10);
    manager.create(config("a-2", "a", "192.168.7.1")).unwrap();
    clock.advance(10);
    let b1 = manager.create(config("b-1", "b", "10.1.0.1")).unwrap();
    manager.mark_running(&b1.id).unwrap();

    let by_pool = manager
        .list(&TaskFilter {
            pool: Some("a".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_pool.len(), 2);
    assert_eq!(by_pool[0].id, "a-2", "newest first");

    let by_status = manager
        .list(&TaskFilter {
            status: Some(TaskState::Running),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_status.len(), 1);
    assert_eq!(by_status[0].id, "b-1");

    // CIDR containment: query IP inside a stored CIDR.
    let by_target = manager
        .list(&TaskFilter {
            target: Some("10.0.0.42".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_target.len(), 1);
    assert_eq!(by_target[0].id, "a-1");

    let limited = manager
        .list(&TaskFilter {
            limit: 1,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn reinstate_resurrects_failed_tasks_only() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), FakeClock::at(0));
    let task = manager.create(config("p-t1", "p", "10.0.0.1")).unwrap();
    manager.mark_running(&task.id).unwrap();
    manager.set_instance(&task.id, "scanner-01").unwrap();
    manager.mark_failed(&task.id, "launch refused", None).unwrap();

    let reinstated = manager.reinstate(&task.id).unwrap();
    assert_eq!(reinstated.state, TaskState::Queued);
    assert!(reinstated.error.is_none());
    assert!(reinstated.instance.is_none());
    assert!(reinstated.started_at_ms.is_none());

    // And the lifecycle can run again.
    manager.mark_running(&task.id).unwrap();

    // Completed tasks stay completed.
    let done = manager.create(config("p-t2", "p", "10.0.0.1")).unwrap();
    manager.mark_running(&done.id).unwrap();
    manager.mark_completed(&done.id, valid()).unwrap();
    assert!(manager.reinstate(&done.id).is_err());
}

#[test]
fn terminal_state_never_changes() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), FakeClock::at(0));
    let task = manager.create(config("p-t1", "p", "10.0.0.1")).unwrap();
    manager.mark_running(&task.id).unwrap();
    manager.mark_completed(&task.id, valid()).unwrap();

    assert!(manager.mark_failed(&task.id, "late", None).is_err());
    assert!(manager.mark_timeout(&task.id).is_err());
    let (read, _) = manager.get(&task.id).unwrap();
    assert_eq!(read.state, TaskState::Completed);
}
