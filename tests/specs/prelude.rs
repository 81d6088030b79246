//! Shared harness for the behavioral specs.

use std::sync::Arc;
use std::time::Duration;

use sw_api::{Orchestrator, SubmitReceipt, SubmitRequest};
use sw_backends::{FakeBackend, FakeBackendFactory};
use sw_core::{Config, CredentialVault, FakeClock, ScanRequest, ScanType, TaskId, TaskState};
use sw_engine::{Worker, WorkerSettings};
use sw_queue::{IdempotencyStore, TaskQueue};
use sw_registry::ScannerRegistry;
use sw_store::TaskStore;
use tokio::sync::watch;

/// One instance `a` with capacity 2 in pool `default`.
pub const DEFAULT_CONFIG: &str = r#"
[pools.default.instances.a]
url = "https://a:8834"
max_concurrent_scans = 2
"#;

pub struct Spec {
    _dir: tempfile::TempDir,
    pub clock: FakeClock,
    pub registry: Arc<ScannerRegistry<FakeClock>>,
    pub queue: Arc<TaskQueue>,
    pub factory: FakeBackendFactory,
    pub orchestrator: Orchestrator<FakeClock>,
    shutdown: watch::Sender<bool>,
}

impl Spec {
    /// Bring up registry, queue, store, orchestrator, and a running
    /// worker with test-speed polling.
    pub fn start(config_toml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = FakeClock::at(1_700_000_000_000);
        let config = Config::from_toml(config_toml).unwrap();

        let registry = Arc::new(ScannerRegistry::new(&config.breaker, clock.clone()));
        registry.load(&config.pools);
        let queue = Arc::new(TaskQueue::in_memory());
        let idempotency = Arc::new(IdempotencyStore::in_memory(
            config.idempotency.ttl_seconds * 1_000,
        ));
        let manager = Arc::new(sw_store::TaskManager::new(
            TaskStore::open(dir.path()).unwrap(),
            clock.clone(),
        ));
        let vault = Arc::new(CredentialVault::new());
        let factory = FakeBackendFactory::new();

        let orchestrator = Orchestrator::new(
            registry.clone(),
            queue.clone(),
            idempotency,
            manager.clone(),
            vault.clone(),
            clock.clone(),
        );

        let mut settings = WorkerSettings::from_config(&config);
        settings.poll_interval = Duration::from_millis(10);
        settings.pop_timeout = Duration::from_millis(25);
        let worker = Arc::new(Worker::new(
            registry.clone(),
            queue.clone(),
            manager.clone(),
            vault.clone(),
            Arc::new(factory.clone()),
            settings,
            clock.clone(),
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(worker.run(shutdown_rx));

        Self {
            _dir: dir,
            clock,
            registry,
            queue,
            factory,
            orchestrator,
            shutdown,
        }
    }

    pub fn backend(&self, pool: &str, instance: &str) -> FakeBackend {
        self.factory.backend_for(pool, instance)
    }

    pub fn submission(&self, name: &str, key: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            pool: None,
            scan_type: ScanType::Untrusted,
            request: ScanRequest {
                targets: "10.0.0.1".to_string(),
                name: name.to_string(),
                description: None,
                credentials: None,
                profile: None,
                custom_fields: None,
            },
            idempotency_key: key.map(str::to_string),
        }
    }

    pub fn submit(&self, name: &str) -> SubmitReceipt {
        self.orchestrator
            .submit_scan(self.submission(name, None))
            .unwrap()
    }

    pub fn state(&self, task_id: &TaskId) -> TaskState {
        self.orchestrator.get_task_status(task_id).unwrap().state
    }

    pub async fn wait_state(&self, task_id: &TaskId, state: TaskState) {
        let reached = wait_until(|| self.state(task_id) == state).await;
        assert!(
            reached,
            "task {task_id} never reached {state}, currently {}",
            self.state(task_id)
        );
    }

    pub fn stop(&self) {
        self.shutdown.send(true).ok();
    }
}

/// Poll a condition for up to six seconds of real time.
pub async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..600 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// A small valid artifact for scans that should complete cleanly.
pub fn clean_export() -> Vec<u8> {
    sw_results::sample::render(
        "spec scan",
        &[(
            "10.0.0.1",
            vec![
                sw_results::sample::item(11219, 2),
                sw_results::sample::item(10180, 0),
            ],
        )],
    )
    .into_bytes()
}
