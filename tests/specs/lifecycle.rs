//! Happy path: submit → queued → running → completed, observable at
//! every step through the orchestrator.

use crate::prelude::*;
use sw_core::TaskState;

#[tokio::test]
async fn submit_runs_and_completes() {
    let spec = Spec::start(DEFAULT_CONFIG);
    let backend = spec.backend("default", "a");
    backend.push_status("pending", None);
    backend.push_status("running", Some(42));
    backend.set_export(clean_export());

    let receipt = spec.submit("weekly");
    // Immediately after submit the task reads back as queued.
    let status = spec.orchestrator.get_task_status(&receipt.task_id).unwrap();
    assert_eq!(status.state, TaskState::Queued);
    assert_eq!(status.pool, "default");

    spec.wait_state(&receipt.task_id, TaskState::Completed).await;

    let status = spec.orchestrator.get_task_status(&receipt.task_id).unwrap();
    assert_eq!(status.instance.as_deref(), Some("a"));
    assert!(status.scanner_scan_id.is_some());
    let summary = status.summary.unwrap();
    assert_eq!(summary.hosts, 1);
    assert_eq!(summary.medium, 1);
    assert!(status.error_message.is_none());
    assert!(status.troubleshooting.is_none());

    // A completed task never changes state afterwards.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(spec.state(&receipt.task_id), TaskState::Completed);
    spec.stop();
}
