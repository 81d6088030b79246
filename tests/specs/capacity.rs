//! Capacity saturation: two cap-1 instances, three tasks. The third
//! oscillates through re-enqueues, staying queued, until a slot frees.

use crate::prelude::*;
use sw_core::TaskState;

const TWO_SINGLE_SLOT_INSTANCES: &str = r#"
[pools.default.instances.a]
url = "https://a:8834"
max_concurrent_scans = 1

[pools.default.instances.b]
url = "https://b:8834"
max_concurrent_scans = 1
"#;

#[tokio::test]
async fn third_task_waits_for_a_free_instance() {
    let spec = Spec::start(TWO_SINGLE_SLOT_INSTANCES);
    for instance in ["a", "b"] {
        let backend = spec.backend("default", instance);
        // Keep both instances busy long enough to observe saturation.
        for _ in 0..40 {
            backend.push_status("running", Some(20));
        }
        backend.set_export(clean_export());
    }

    let t1 = spec.submit("T1");
    let t2 = spec.submit("T2");
    spec.wait_state(&t1.task_id, TaskState::Running).await;
    spec.wait_state(&t2.task_id, TaskState::Running).await;

    let t3 = spec.submit("T3");

    // While both instances are saturated T3 stays queued, and no
    // instance ever exceeds its cap.
    for _ in 0..20 {
        assert_eq!(spec.state(&t3.task_id), TaskState::Queued);
        for view in spec.registry.snapshot() {
            assert!(view.active <= view.cap);
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // Once T3 runs, at least one of T1/T2 must already be done.
    spec.wait_state(&t3.task_id, TaskState::Running).await;
    let finished = [&t1, &t2]
        .iter()
        .filter(|r| spec.state(&r.task_id) == TaskState::Completed)
        .count();
    assert!(finished >= 1, "T3 ran before any slot was released");

    for receipt in [&t1, &t2, &t3] {
        spec.wait_state(&receipt.task_id, TaskState::Completed).await;
    }
    spec.stop();
}
