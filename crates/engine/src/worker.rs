// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker: per-pool dispatch loops plus one in-flight task per scan.
//!
//! Dispatch waits for a slot in the worker-wide budget, blocking-pops the
//! pool queue, and spawns an in-flight task that drives the backend
//! through authenticate → create → launch → poll → export → validate.
//! Capacity and breaker rejections re-enqueue at the tail, paced, without
//! touching task state; infrastructure failures dead-letter the entry.

use std::sync::Arc;
use std::time::Duration;
use sw_backends::{classify_status, BackendError, BackendFactory, ScanPhase, ScanSpec, ScannerBackend};
use sw_core::{AuthenticationStatus, Clock, Config, CredentialVault, TaskId};
use sw_queue::{QueueEntry, TaskQueue};
use sw_registry::{ScannerRegistry, SelectError};
use sw_store::TaskManager;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Pacing before a capacity-rejected entry rejoins the tail.
const REQUEUE_DELAY: Duration = Duration::from_millis(500);

/// Bounded retries for transient backend errors, exponential from this base.
const MAX_TRANSIENT_RETRIES: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Worker tunables.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub subscriptions: Vec<String>,
    pub max_concurrent_scans: u32,
    pub poll_interval: Duration,
    pub scan_deadline: Duration,
    pub pop_timeout: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            subscriptions: config.subscriptions(),
            max_concurrent_scans: config.worker.max_concurrent_scans,
            poll_interval: Duration::from_secs(config.worker.poll_interval_seconds),
            scan_deadline: Duration::from_secs(config.worker.scan_deadline_seconds),
            pop_timeout: Duration::from_secs(config.queue.pop_timeout_seconds),
        }
    }
}

/// How one in-flight scan ended, from the dispatcher's point of view.
enum ScanOutcome {
    Completed,
    /// Scan-logical failure (validator verdict, lost credentials). The
    /// instance behaved, so this never dead-letters or trips the breaker.
    ScanFailed,
    Timeout,
    /// Worker shutdown mid-scan; the task stays `running` for
    /// administrative reconciliation.
    Shutdown,
    /// Infrastructure failure: dead-letter the entry and feed the breaker.
    Infrastructure(String),
}

pub struct Worker<F: BackendFactory, C: Clock> {
    registry: Arc<ScannerRegistry<C>>,
    queue: Arc<TaskQueue>,
    manager: Arc<TaskManager<C>>,
    vault: Arc<CredentialVault>,
    factory: Arc<F>,
    settings: WorkerSettings,
    clock: C,
    capacity: Arc<Semaphore>,
}

impl<F: BackendFactory, C: Clock> Worker<F, C> {
    pub fn new(
        registry: Arc<ScannerRegistry<C>>,
        queue: Arc<TaskQueue>,
        manager: Arc<TaskManager<C>>,
        vault: Arc<CredentialVault>,
        factory: Arc<F>,
        settings: WorkerSettings,
        clock: C,
    ) -> Self {
        let capacity = Arc::new(Semaphore::new(settings.max_concurrent_scans as usize));
        Self {
            registry,
            queue,
            manager,
            vault,
            factory,
            settings,
            clock,
            capacity,
        }
    }

    /// Run one dispatch loop per subscribed pool until shutdown.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::new();
        for pool in self.settings.subscriptions.clone() {
            let worker = Arc::clone(&self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(worker.dispatch_loop(pool, shutdown)));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn dispatch_loop(self: Arc<Self>, pool: String, shutdown: watch::Receiver<bool>) {
        info!(pool, "dispatch loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let Ok(permit) = Arc::clone(&self.capacity).acquire_owned().await else {
                break;
            };

            let mut shutdown_wait = shutdown.clone();
            let dequeued = tokio::select! {
                biased;
                result = self.queue.dequeue(&pool, self.settings.pop_timeout) => match result {
                    Ok(entry) => entry,
                    Err(error) => {
                        warn!(pool, %error, "dequeue failed, backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        None
                    }
                },
                _ = shutdown_wait.changed() => None,
            };
            let Some(entry) = dequeued else {
                drop(permit);
                continue;
            };

            let worker = Arc::clone(&self);
            let scan_shutdown = shutdown.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker.run_entry(entry, scan_shutdown).await;
            });
        }
        info!(pool, "dispatch loop stopped");
    }

    async fn run_entry(&self, entry: QueueEntry, shutdown: watch::Receiver<bool>) {
        let task_id = entry.task_id.clone();
        let pool = entry.pool.clone();

        // Selection and reservation come before the running transition so
        // a capacity-starved task stays `queued` while it oscillates.
        let instance = match self.registry.select(&pool) {
            Ok(instance) => instance,
            Err(SelectError::NoCapacity(_)) => {
                self.requeue(entry).await;
                return;
            }
            Err(error @ SelectError::UnknownPool(_)) => {
                if let Err(error) = self.manager.mark_failed(&task_id, error.to_string(), None) {
                    error!(task_id = %task_id, %error, "could not fail task on unknown pool");
                }
                return;
            }
        };
        if self.registry.reserve(&pool, &instance).is_err() {
            // Lost the race against another in-flight task.
            self.requeue(entry).await;
            return;
        }
        if !self.registry.breaker_allow(&pool, &instance) {
            self.registry.release(&pool, &instance);
            self.requeue(entry).await;
            return;
        }

        let outcome = self.drive(&entry, &instance, shutdown).await;
        self.registry.release(&pool, &instance);
        match outcome {
            ScanOutcome::Completed | ScanOutcome::ScanFailed => {
                self.registry.record_success(&pool, &instance);
                self.vault.discard(&task_id);
            }
            ScanOutcome::Timeout => {
                self.vault.discard(&task_id);
            }
            ScanOutcome::Shutdown => {}
            ScanOutcome::Infrastructure(reason) => {
                self.registry.record_failure(&pool, &instance);
                // Secrets stay vaulted so an administrative retry can reuse them.
                let now_ms = self.clock.epoch_ms();
                if let Err(error) = self.queue.dead_letter(entry, &reason, now_ms) {
                    error!(task_id = %task_id, %error, "failed to dead-letter entry");
                }
            }
        }
    }

    async fn drive(
        &self,
        entry: &QueueEntry,
        instance: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> ScanOutcome {
        let task_id = &entry.task_id;
        let pool = &entry.pool;
        let store = self.manager.store();

        if let Err(error) = self.manager.mark_running(task_id) {
            // A stale entry for a task that is already terminal.
            warn!(task_id = %task_id, %error, "cannot start dequeued task");
            return ScanOutcome::ScanFailed;
        }
        if let Err(error) = self.manager.set_instance(task_id, instance) {
            return self.fail_infra(task_id, format!("annotate instance: {error}"));
        }
        store.append_worker_log(
            task_id,
            self.clock.epoch_ms(),
            &format!("assigned to {pool}/{instance}"),
        );

        let task = match store.read(task_id) {
            Ok(task) => task,
            Err(error) => return self.fail_infra(task_id, format!("read task record: {error}")),
        };

        let credentials = match (&task.request.credentials, self.vault.get(task_id)) {
            (Some(_), Some(secret)) => Some(secret),
            (Some(_), None) => {
                let message =
                    "scan credentials are no longer available (daemon restarted?); resubmit the scan";
                if let Err(error) = self.manager.mark_failed(task_id, message, None) {
                    error!(task_id = %task_id, %error, "could not fail task");
                }
                return ScanOutcome::ScanFailed;
            }
            (None, _) => None,
        };
        if task.scan_type.is_authenticated() && credentials.is_none() {
            let message = "authenticated scan submitted without credentials";
            if let Err(error) = self.manager.mark_failed(task_id, message, None) {
                error!(task_id = %task_id, %error, "could not fail task");
            }
            return ScanOutcome::ScanFailed;
        }

        let Some(instance_config) = self.registry.instance_config(pool, instance) else {
            return self.fail_infra(task_id, "instance retired during dispatch".to_string());
        };
        let backend = match self.factory.connect(pool, instance, &instance_config) {
            Ok(backend) => backend,
            Err(error) => return self.fail_infra(task_id, format!("backend connect: {error}")),
        };

        if let Err(error) = backend.authenticate().await {
            return self.fail_infra(task_id, format!("scanner authentication: {error}"));
        }

        let spec = ScanSpec {
            name: task.request.name.clone(),
            description: task.request.description.clone(),
            targets: task.request.targets.clone(),
            scan_type: task.scan_type,
            credentials,
        };
        let scan_id = match backend.create(&spec).await {
            Ok(scan_id) => scan_id,
            Err(error) => return self.fail_infra(task_id, format!("create scan: {error}")),
        };
        drop(spec);
        if let Err(error) = self.manager.set_scanner_scan_id(task_id, scan_id) {
            return self.fail_infra(task_id, format!("annotate scan id: {error}"));
        }
        store.append_worker_log(
            task_id,
            self.clock.epoch_ms(),
            &format!("scan {scan_id} created"),
        );

        if let Err(error) = backend.launch(scan_id).await {
            return self.fail_infra(task_id, format!("launch scan {scan_id}: {error}"));
        }
        store.append_worker_log(
            task_id,
            self.clock.epoch_ms(),
            &format!("scan {scan_id} launched"),
        );

        let deadline_ms = self.clock.epoch_ms() + self.settings.scan_deadline.as_millis() as u64;
        let mut transient_failures = 0u32;
        let verdict: Result<(), String> = loop {
            if *shutdown.borrow() {
                let _ = backend.stop(scan_id).await;
                store.append_worker_log(
                    task_id,
                    self.clock.epoch_ms(),
                    "shutdown: task left running for reconciliation",
                );
                info!(task_id = %task_id, "shutdown mid-scan, task left running");
                return ScanOutcome::Shutdown;
            }
            if self.clock.epoch_ms() >= deadline_ms {
                break Err(String::new());
            }
            match backend.status(scan_id).await {
                Ok(view) => {
                    transient_failures = 0;
                    if let Some(progress) = view.progress {
                        self.manager.update_progress(task_id, progress);
                    }
                    match classify_status(&view.status) {
                        ScanPhase::Starting | ScanPhase::Running => {}
                        ScanPhase::Completed => break Ok(()),
                        ScanPhase::Failed => {
                            break Err(format!("scanner reported scan as {}", view.status))
                        }
                    }
                }
                Err(error) if error.is_retryable() && transient_failures < MAX_TRANSIENT_RETRIES => {
                    transient_failures += 1;
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(transient_failures - 1);
                    warn!(
                        task_id = %task_id,
                        attempt = transient_failures,
                        %error,
                        "status poll failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(error) => {
                    return self.fail_infra(task_id, format!("status poll: {error}"));
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        };

        // The deadline wins even over a completion observed after it.
        if self.clock.epoch_ms() >= deadline_ms {
            let _ = backend.stop(scan_id).await;
            if let Err(error) = self.manager.mark_timeout(task_id) {
                error!(task_id = %task_id, %error, "could not mark task timed out");
            }
            store.append_worker_log(task_id, self.clock.epoch_ms(), "scan deadline exceeded");
            return ScanOutcome::Timeout;
        }
        if let Err(reason) = verdict {
            return self.fail_infra(task_id, reason);
        }

        let artifact = match self.export_with_retries(&backend, scan_id).await {
            Ok(bytes) => bytes,
            Err(error) => return self.fail_infra(task_id, format!("export: {error}")),
        };
        if let Err(error) = store.write_artifact(task_id, &artifact) {
            return self.fail_infra(task_id, format!("persist artifact: {error}"));
        }
        store.append_worker_log(
            task_id,
            self.clock.epoch_ms(),
            &format!("exported {} bytes", artifact.len()),
        );

        let validation = sw_results::validate(&artifact, task.scan_type);

        // Tidy the appliance; cleanup failures are warnings, not task failures.
        let _ = backend.delete(scan_id).await;
        let _ = backend.close().await;

        let auth_failed = task.scan_type.is_authenticated()
            && validation.authentication_status == AuthenticationStatus::Failed;
        if auth_failed {
            let message = "authentication failed during credentialed scan; \
                 verify credentials, target reachability, firewall rules, and account privileges";
            if let Err(error) = self.manager.mark_failed(task_id, message, Some(validation)) {
                error!(task_id = %task_id, %error, "could not mark task failed");
            }
            return ScanOutcome::ScanFailed;
        }
        if !validation.is_valid {
            let message = format!("report validation failed: {}", validation.warnings.join("; "));
            if let Err(error) = self.manager.mark_failed(task_id, message, Some(validation)) {
                error!(task_id = %task_id, %error, "could not mark task failed");
            }
            return ScanOutcome::ScanFailed;
        }
        if let Err(error) = self.manager.mark_completed(task_id, validation) {
            error!(task_id = %task_id, %error, "could not mark task completed");
            return ScanOutcome::ScanFailed;
        }
        debug!(task_id = %task_id, "scan completed");
        ScanOutcome::Completed
    }

    async fn export_with_retries(
        &self,
        backend: &F::Backend,
        scan_id: i64,
    ) -> Result<Vec<u8>, BackendError> {
        let mut attempt = 0u32;
        loop {
            match backend.export(scan_id, "nessus").await {
                Ok(bytes) => return Ok(bytes),
                Err(error) if error.is_retryable() && attempt < MAX_TRANSIENT_RETRIES => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                    warn!(scan_id, attempt, %error, "export failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn requeue(&self, entry: QueueEntry) {
        tokio::time::sleep(REQUEUE_DELAY).await;
        let requeued = entry.requeued(self.clock.epoch_ms());
        debug!(
            task_id = %requeued.task_id,
            attempts = requeued.attempts,
            "re-enqueued after capacity rejection"
        );
        if let Err(error) = self.queue.enqueue(requeued) {
            error!(task_id = %entry.task_id, %error, "re-enqueue failed");
        }
    }

    fn fail_infra(&self, task_id: &TaskId, reason: String) -> ScanOutcome {
        error!(task_id = %task_id, %reason, "scan infrastructure failure");
        self.manager
            .store()
            .append_worker_log(task_id, self.clock.epoch_ms(), &reason);
        if let Err(error) = self.manager.mark_failed(task_id, &reason, None) {
            error!(task_id = %task_id, %error, "could not mark task failed");
        }
        ScanOutcome::Infrastructure(reason)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
