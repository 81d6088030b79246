// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sw_core::{Config, Credentials, FakeClock, Validation};
use sw_results::sample;
use sw_store::TaskStore;

const CONFIG: &str = r#"
[pools.default.instances.a]
url = "https://a:8834"
max_concurrent_scans = 2

[pools.spare.instances.z]
url = "https://z:8834"
enabled = false
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    clock: FakeClock,
    orchestrator: Orchestrator<FakeClock>,
    manager: Arc<TaskManager<FakeClock>>,
    queue: Arc<TaskQueue>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::at(1_000_000);
    let config = Config::from_toml(CONFIG).unwrap();
    let registry = Arc::new(ScannerRegistry::new(&config.breaker, clock.clone()));
    registry.load(&config.pools);
    let queue = Arc::new(TaskQueue::in_memory());
    let idempotency = Arc::new(IdempotencyStore::in_memory(48 * 3_600_000));
    let manager = Arc::new(TaskManager::new(
        TaskStore::open(dir.path()).unwrap(),
        clock.clone(),
    ));
    let vault = Arc::new(CredentialVault::new());
    let orchestrator = Orchestrator::new(
        registry,
        queue.clone(),
        idempotency,
        manager.clone(),
        vault,
        clock.clone(),
    );
    Fixture {
        _dir: dir,
        clock,
        orchestrator,
        manager,
        queue,
    }
}

fn request(name: &str) -> ScanRequest {
    ScanRequest {
        targets: "10.0.0.1".to_string(),
        name: name.to_string(),
        description: None,
        credentials: None,
        profile: None,
        custom_fields: None,
    }
}

fn submission(name: &str, key: Option<&str>) -> SubmitRequest {
    SubmitRequest {
        pool: None,
        scan_type: ScanType::Untrusted,
        request: request(name),
        idempotency_key: key.map(str::to_string),
    }
}

#[test]
fn submit_creates_queued_task() {
    let f = fixture();
    let receipt = f.orchestrator.submit_scan(submission("s1", None)).unwrap();

    assert_eq!(receipt.pool, "default");
    assert!(!receipt.idempotent);
    assert_eq!(receipt.queue_position, 1);
    assert_eq!(receipt.estimated_wait_s, 0);
    assert!(receipt.task_id.as_str().starts_with("default-"));

    let status = f.orchestrator.get_task_status(&receipt.task_id).unwrap();
    assert_eq!(status.state, TaskState::Queued);
    assert_eq!(f.queue.depth("default"), 1);
}

#[test]
fn empty_targets_are_rejected() {
    let f = fixture();
    let mut bad = submission("s1", None);
    bad.request.targets = "  ".to_string();
    assert!(matches!(
        f.orchestrator.submit_scan(bad),
        Err(ApiError::InvalidArgument(_))
    ));
}

#[test]
fn unknown_pool_is_not_found() {
    let f = fixture();
    let mut bad = submission("s1", None);
    bad.pool = Some("ghost".to_string());
    assert!(matches!(
        f.orchestrator.submit_scan(bad),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn pool_without_enabled_instances_is_unavailable() {
    let f = fixture();
    let mut bad = submission("s1", None);
    bad.pool = Some("spare".to_string());
    assert!(matches!(
        f.orchestrator.submit_scan(bad),
        Err(ApiError::Unavailable(_))
    ));
}

#[test]
fn authenticated_scan_requires_credentials() {
    let f = fixture();
    let mut bad = submission("s1", None);
    bad.scan_type = ScanType::Authenticated;
    assert!(matches!(
        f.orchestrator.submit_scan(bad),
        Err(ApiError::InvalidArgument(_))
    ));

    let mut good = submission("s1", None);
    good.scan_type = ScanType::Authenticated;
    good.request.credentials = Some(Credentials {
        username: "svc".to_string(),
        password: "pw".to_string(),
        method: Default::default(),
    });
    assert!(f.orchestrator.submit_scan(good).is_ok());
}

#[test]
fn profile_and_custom_fields_conflict_at_submit() {
    let f = fixture();
    let mut bad = submission("s1", None);
    bad.request.profile = Some("full".to_string());
    bad.request.custom_fields = Some(vec!["host".to_string()]);
    assert!(matches!(
        f.orchestrator.submit_scan(bad),
        Err(ApiError::InvalidArgument(_))
    ));
}

#[test]
fn idempotent_resubmission_returns_same_task() {
    let f = fixture();
    let first = f
        .orchestrator
        .submit_scan(submission("s1", Some("K1")))
        .unwrap();
    let second = f
        .orchestrator
        .submit_scan(submission("s1", Some("K1")))
        .unwrap();

    assert_eq!(second.task_id, first.task_id);
    assert!(second.idempotent);
    assert_eq!(f.queue.depth("default"), 1, "no duplicate enqueue");
}

#[test]
fn idempotency_key_reuse_with_different_request_conflicts() {
    let f = fixture();
    f.orchestrator
        .submit_scan(submission("s1", Some("K1")))
        .unwrap();
    let before = f.queue.depth("default");

    assert!(matches!(
        f.orchestrator.submit_scan(submission("s2", Some("K1"))),
        Err(ApiError::Conflict(_))
    ));
    assert_eq!(f.queue.depth("default"), before, "no task created");
}

#[test]
fn idempotency_key_reuse_with_different_custom_fields_conflicts() {
    let f = fixture();
    let mut first = submission("s1", Some("K1"));
    first.request.custom_fields = Some(vec!["host".to_string()]);
    f.orchestrator.submit_scan(first).unwrap();

    let mut second = submission("s1", Some("K1"));
    second.request.custom_fields = Some(vec!["severity".to_string(), "cve".to_string()]);
    assert!(matches!(
        f.orchestrator.submit_scan(second),
        Err(ApiError::Conflict(_))
    ));
}

#[test]
fn status_of_unknown_task_is_not_found() {
    let f = fixture();
    assert!(matches!(
        f.orchestrator.get_task_status(&TaskId::new("ghost")),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn results_require_a_completed_task() {
    let f = fixture();
    let receipt = f.orchestrator.submit_scan(submission("s1", None)).unwrap();
    assert!(matches!(
        f.orchestrator
            .get_task_results(&receipt.task_id, &ResultsRequest::default()),
        Err(ApiError::Conflict(_))
    ));
}

fn complete_with_artifact(f: &Fixture, task_id: &TaskId) {
    f.manager.mark_running(task_id).unwrap();
    let artifact = sample::render(
        "s1",
        &[(
            "10.0.0.1",
            vec![sample::item(1, 3), sample::item(2, 2), sample::item(3, 0)],
        )],
    );
    f.manager
        .store()
        .write_artifact(task_id, artifact.as_bytes())
        .unwrap();
    f.manager
        .mark_completed(
            task_id,
            Validation {
                is_valid: true,
                authentication_status: AuthenticationStatus::NotApplicable,
                warnings: Vec::new(),
                stats: None,
            },
        )
        .unwrap();
}

#[test]
fn results_render_ndjson_for_completed_task() {
    let f = fixture();
    let receipt = f.orchestrator.submit_scan(submission("s1", None)).unwrap();
    complete_with_artifact(&f, &receipt.task_id);

    let output = f
        .orchestrator
        .get_task_results(&receipt.task_id, &ResultsRequest::default())
        .unwrap();
    let first: serde_json::Value = serde_json::from_str(output.lines().next().unwrap()).unwrap();
    assert_eq!(first["type"], "schema");
    assert_eq!(first["profile"], "brief");
    assert_eq!(first["total_vulnerabilities"], 3);

    let repeat = f
        .orchestrator
        .get_task_results(&receipt.task_id, &ResultsRequest::default())
        .unwrap();
    assert_eq!(output, repeat, "byte-identical on identical arguments");
}

#[test]
fn results_page_size_bounds_are_caller_errors() {
    let f = fixture();
    let receipt = f.orchestrator.submit_scan(submission("s1", None)).unwrap();
    complete_with_artifact(&f, &receipt.task_id);

    let bad = ResultsRequest {
        page: 1,
        page_size: Some(7),
        ..Default::default()
    };
    assert!(matches!(
        f.orchestrator.get_task_results(&receipt.task_id, &bad),
        Err(ApiError::InvalidArgument(_))
    ));
}

#[test]
fn list_tasks_filters_by_target() {
    let f = fixture();
    let mut wide = submission("wide", None);
    wide.request.targets = "10.0.0.0/24".to_string();
    let receipt = f.orchestrator.submit_scan(wide).unwrap();
    f.orchestrator.submit_scan(submission("other", None)).unwrap();

    let hits = f
        .orchestrator
        .list_tasks(&TaskFilter {
            target: Some("10.0.0.77".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].task_id, receipt.task_id);
}

#[test]
fn pool_and_queue_status_report_metrics() {
    let f = fixture();
    f.orchestrator.submit_scan(submission("s1", None)).unwrap();
    f.orchestrator.submit_scan(submission("s2", None)).unwrap();

    let pool = f.orchestrator.get_pool_status("default").unwrap();
    assert_eq!(pool.capacity, 2);
    assert_eq!(pool.active, 0);
    assert_eq!(pool.instances, 1);

    let queue = f.orchestrator.get_queue_status("default").unwrap();
    assert_eq!(queue.depth, 2);
    assert_eq!(queue.dlq_depth, 0);
    assert_eq!(queue.next.len(), 2);

    assert!(matches!(
        f.orchestrator.get_pool_status("ghost"),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn dlq_admin_round_trip() {
    let f = fixture();
    let receipt = f.orchestrator.submit_scan(submission("s1", None)).unwrap();

    // Simulate the worker dead-lettering the task.
    f.manager.mark_running(&receipt.task_id).unwrap();
    f.manager
        .mark_failed(&receipt.task_id, "launch refused", None)
        .unwrap();
    let entry = f
        .queue
        .try_dequeue(&receipt.pool)
        .unwrap()
        .expect("entry queued");
    f.queue
        .dead_letter(entry, "launch refused", f.clock.epoch_ms())
        .unwrap();

    let letters = f.orchestrator.dlq_list("default", 10).unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(
        f.orchestrator
            .dlq_get("default", &receipt.task_id)
            .unwrap()
            .reason,
        "launch refused"
    );

    f.orchestrator.dlq_retry("default", &receipt.task_id).unwrap();
    assert_eq!(f.queue.dlq_depth("default"), 0);
    assert_eq!(f.queue.depth("default"), 1);
    let status = f.orchestrator.get_task_status(&receipt.task_id).unwrap();
    assert_eq!(status.state, TaskState::Queued);

    assert!(matches!(
        f.orchestrator.dlq_retry("default", &TaskId::new("ghost")),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn dlq_purge_reports_count() {
    let f = fixture();
    let receipt = f.orchestrator.submit_scan(submission("s1", None)).unwrap();
    let entry = f
        .queue
        .try_dequeue(&receipt.pool)
        .unwrap()
        .expect("entry queued");
    f.queue.dead_letter(entry, "boom", 1).unwrap();

    assert_eq!(f.orchestrator.dlq_purge("default").unwrap(), 1);
    assert_eq!(f.orchestrator.dlq_purge("default").unwrap(), 0);
}
