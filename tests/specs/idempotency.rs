//! Idempotency-key semantics: same key + same request dedupes, same key
//! + different request conflicts.

use crate::prelude::*;
use sw_api::ApiError;

#[tokio::test]
async fn idempotent_retry_and_conflict() {
    let spec = Spec::start(DEFAULT_CONFIG);
    spec.backend("default", "a").set_export(clean_export());

    let first = spec
        .orchestrator
        .submit_scan(spec.submission("S1", Some("K1")))
        .unwrap();
    assert!(!first.idempotent);

    // Immediate resubmission with the same key returns the same task.
    let second = spec
        .orchestrator
        .submit_scan(spec.submission("S1", Some("K1")))
        .unwrap();
    assert_eq!(second.task_id, first.task_id);
    assert!(second.idempotent);

    // Same key, different name: conflict, and no new task is created.
    let before = spec
        .orchestrator
        .list_tasks(&Default::default())
        .unwrap()
        .len();
    let conflict = spec
        .orchestrator
        .submit_scan(spec.submission("S2", Some("K1")));
    assert!(matches!(conflict, Err(ApiError::Conflict(_))));
    let after = spec
        .orchestrator
        .list_tasks(&Default::default())
        .unwrap()
        .len();
    assert_eq!(before, after);
    spec.stop();
}

#[tokio::test]
async fn expired_key_allows_a_fresh_task() {
    let spec = Spec::start(DEFAULT_CONFIG);
    spec.backend("default", "a").set_export(clean_export());

    let first = spec
        .orchestrator
        .submit_scan(spec.submission("S1", Some("K2")))
        .unwrap();

    // Default TTL is 48 hours.
    spec.clock.advance(48 * 3_600_000 + 1);
    let second = spec
        .orchestrator
        .submit_scan(spec.submission("S1", Some("K2")))
        .unwrap();
    assert_ne!(second.task_id, first.task_id);
    assert!(!second.idempotent);
    spec.stop();
}
