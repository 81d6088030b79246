//! Scan deadline: a scan that never finishes is stopped best-effort and
//! transitions to timeout, even if the scanner would report completion
//! just after the deadline.

use crate::prelude::*;
use sw_core::TaskState;

const SHORT_DEADLINE: &str = r#"
[pools.default.instances.a]
url = "https://a:8834"
max_concurrent_scans = 2

[worker]
scan_deadline_seconds = 60
"#;

#[tokio::test]
async fn endless_scan_times_out_and_is_stopped() {
    let spec = Spec::start(SHORT_DEADLINE);
    let backend = spec.backend("default", "a");
    for _ in 0..2_000 {
        backend.push_status("running", Some(10));
    }

    let receipt = spec.submit("endless");
    spec.wait_state(&receipt.task_id, TaskState::Running).await;

    // Cross the 60-second deadline.
    spec.clock.advance(61_000);
    spec.wait_state(&receipt.task_id, TaskState::Timeout).await;

    assert!(backend.stop_requested(), "best-effort stop was issued");
    let status = spec.orchestrator.get_task_status(&receipt.task_id).unwrap();
    assert_eq!(status.error_message.as_deref(), Some("scan deadline exceeded"));

    // Terminal: a late "completed" from the scanner changes nothing.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(spec.state(&receipt.task_id), TaskState::Timeout);
    spec.stop();
}
