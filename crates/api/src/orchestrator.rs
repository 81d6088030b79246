// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public entry points for the orchestration kernel.
//!
//! Everything here is synchronous request/response; the asynchronous part
//! of the system (the worker) communicates with callers only through the
//! task records these functions read.

use crate::error::ApiError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use sw_core::{
    AuthenticationStatus, Clock, CredentialVault, ReportStats, ScanRequest, ScanType,
    SchemaProfile, TaskConfig, TaskId, TaskState, TraceId,
};
use sw_queue::{fingerprint, DeadLetter, IdempotencyStore, QueueEntry, Reservation, TaskQueue};
use sw_registry::{InstanceView, ScannerRegistry};
use sw_results::pipeline::{self, ResultsQuery};
use sw_store::{TaskFilter, TaskManager};
use tracing::info;

/// Naive per-queue-slot wait estimate.
const AVERAGE_SCAN_SECONDS: u64 = 600;

/// One scan submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Defaults to `"default"`.
    pub pool: Option<String>,
    pub scan_type: ScanType,
    pub request: ScanRequest,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub task_id: TaskId,
    pub pool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_hint: Option<String>,
    pub queue_position: usize,
    pub estimated_wait_s: u64,
    /// True when an idempotency key matched an existing task.
    pub idempotent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub pool: String,
    pub scan_type: ScanType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner_scan_id: Option<i64>,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_status: Option<AuthenticationStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReportStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub troubleshooting: Option<Vec<String>>,
}

/// Compact row for task listings.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub state: TaskState,
    pub pool: String,
    pub scan_type: ScanType,
    pub name: String,
    pub targets: String,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One results read.
#[derive(Debug, Clone, Default)]
pub struct ResultsRequest {
    /// 1-based page, or 0 for everything.
    pub page: u32,
    pub page_size: Option<u32>,
    pub profile: Option<String>,
    pub custom_fields: Option<Vec<String>>,
    pub filters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub pool: String,
    pub instances: usize,
    pub capacity: u32,
    pub active: u32,
    pub utilization: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub pool: String,
    pub depth: usize,
    pub dlq_depth: usize,
    pub next: Vec<QueueEntry>,
}

/// The orchestrator facade.
pub struct Orchestrator<C: Clock> {
    registry: Arc<ScannerRegistry<C>>,
    queue: Arc<TaskQueue>,
    idempotency: Arc<IdempotencyStore>,
    manager: Arc<TaskManager<C>>,
    vault: Arc<CredentialVault>,
    clock: C,
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(
        registry: Arc<ScannerRegistry<C>>,
        queue: Arc<TaskQueue>,
        idempotency: Arc<IdempotencyStore>,
        manager: Arc<TaskManager<C>>,
        vault: Arc<CredentialVault>,
        clock: C,
    ) -> Self {
        Self {
            registry,
            queue,
            idempotency,
            manager,
            vault,
            clock,
        }
    }

    /// Record a scan intent and enqueue it.
    pub fn submit_scan(&self, submission: SubmitRequest) -> Result<SubmitReceipt, ApiError> {
        let SubmitRequest {
            pool,
            scan_type,
            request,
            idempotency_key,
        } = submission;

        if request.targets.trim().is_empty() {
            return Err(ApiError::InvalidArgument(
                "targets must not be empty".to_string(),
            ));
        }
        if request.name.trim().is_empty() {
            return Err(ApiError::InvalidArgument(
                "scan name must not be empty".to_string(),
            ));
        }
        // Shape-check the profile selection now, not at first read.
        SchemaProfile::resolve(request.profile.as_deref(), request.custom_fields.as_deref())?;
        if scan_type.is_authenticated() && request.credentials.is_none() {
            return Err(ApiError::InvalidArgument(
                "authenticated scans require credentials".to_string(),
            ));
        }

        let pool = pool.unwrap_or_else(|| "default".to_string());
        if !self.registry.contains_pool(&pool) {
            return Err(ApiError::NotFound(format!("pool: {pool}")));
        }
        if !self.registry.has_enabled_instances(&pool) {
            return Err(ApiError::Unavailable(format!(
                "pool {pool} has no enabled instances"
            )));
        }

        let request_fingerprint = fingerprint(&pool, scan_type, &request);
        let instance_hint = self.registry.select(&pool).ok();
        let task_id = TaskId::generate(&pool, instance_hint.as_deref());

        if let Some(key) = &idempotency_key {
            let now_ms = self.clock.epoch_ms();
            match self
                .idempotency
                .reserve(key, &task_id, &request_fingerprint, now_ms)?
            {
                Reservation::Inserted => {}
                Reservation::Existing(existing) => {
                    info!(task_id = %existing, key, "idempotent resubmission");
                    let queue_position = self.queue.position(&pool, &existing).unwrap_or(0);
                    return Ok(SubmitReceipt {
                        task_id: existing,
                        pool,
                        instance_hint,
                        queue_position,
                        estimated_wait_s: estimated_wait(queue_position),
                        idempotent: true,
                    });
                }
                Reservation::Conflict => {
                    return Err(ApiError::Conflict(format!(
                        "idempotency key {key} was already used for a different request"
                    )));
                }
            }
        }

        let credentials = request.credentials.clone();
        self.manager.create(TaskConfig {
            id: task_id.clone(),
            trace_id: TraceId::generate(),
            pool: pool.clone(),
            scan_type,
            request,
        })?;
        if let Some(credentials) = credentials {
            self.vault.put(task_id.clone(), credentials);
        }
        self.queue.enqueue(QueueEntry::new(
            task_id.clone(),
            pool.clone(),
            self.clock.epoch_ms(),
        ))?;

        let queue_position = self
            .queue
            .position(&pool, &task_id)
            .unwrap_or_else(|| self.queue.depth(&pool));
        Ok(SubmitReceipt {
            task_id,
            pool,
            instance_hint,
            queue_position,
            estimated_wait_s: estimated_wait(queue_position),
            idempotent: false,
        })
    }

    pub fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus, ApiError> {
        let (task, progress) = self.manager.get(task_id)?;
        let authentication_status = task.validation.as_ref().map(|v| v.authentication_status);
        let troubleshooting = (task.scan_type.is_authenticated()
            && authentication_status == Some(AuthenticationStatus::Failed))
        .then(sw_results::troubleshooting_hints);
        Ok(TaskStatus {
            task_id: task.id,
            state: task.state,
            pool: task.pool,
            scan_type: task.scan_type,
            progress,
            instance: task.instance,
            scanner_scan_id: task.scanner_scan_id,
            created_at_ms: task.created_at_ms,
            started_at_ms: task.started_at_ms,
            completed_at_ms: task.completed_at_ms,
            authentication_status,
            warnings: task
                .validation
                .as_ref()
                .map(|v| v.warnings.clone())
                .unwrap_or_default(),
            summary: task.validation.as_ref().and_then(|v| v.stats),
            error_message: task.error,
            troubleshooting,
        })
    }

    /// Render a completed task's results as NDJSON.
    pub fn get_task_results(
        &self,
        task_id: &TaskId,
        request: &ResultsRequest,
    ) -> Result<String, ApiError> {
        let (task, _) = self.manager.get(task_id)?;
        if task.state != TaskState::Completed {
            return Err(ApiError::Conflict(format!(
                "task {task_id} is {}; results require a completed task",
                task.state
            )));
        }

        // Read-time selection wins; the submission's profile is the fallback.
        let profile_name = request
            .profile
            .clone()
            .or_else(|| task.request.profile.clone());
        let custom_fields = request
            .custom_fields
            .clone()
            .or_else(|| task.request.custom_fields.clone());
        let profile = SchemaProfile::resolve(profile_name.as_deref(), custom_fields.as_deref())?;

        let artifact = self.manager.store().read_artifact(task_id)?;
        let query = ResultsQuery {
            page: request.page,
            page_size: request.page_size.unwrap_or(pipeline::DEFAULT_PAGE_SIZE),
            profile,
            filters: request.filters.clone(),
        };
        Ok(pipeline::render(&artifact, &query)?)
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskSummary>, ApiError> {
        Ok(self
            .manager
            .list(filter)?
            .into_iter()
            .map(|task| TaskSummary {
                task_id: task.id,
                state: task.state,
                pool: task.pool,
                scan_type: task.scan_type,
                name: task.request.name,
                targets: task.request.targets,
                created_at_ms: task.created_at_ms,
                completed_at_ms: task.completed_at_ms,
                error_message: task.error,
            })
            .collect())
    }

    pub fn list_scanners(&self) -> Vec<InstanceView> {
        self.registry.snapshot()
    }

    pub fn list_pools(&self) -> Vec<String> {
        self.registry.pool_names()
    }

    pub fn get_pool_status(&self, pool: &str) -> Result<PoolStatus, ApiError> {
        if !self.registry.contains_pool(pool) {
            return Err(ApiError::NotFound(format!("pool: {pool}")));
        }
        let mut capacity = 0u32;
        let mut active = 0u32;
        let mut instances = 0usize;
        for view in self.registry.snapshot() {
            if view.pool != pool {
                continue;
            }
            instances += 1;
            if view.enabled {
                capacity += view.cap;
            }
            active += view.active;
        }
        Ok(PoolStatus {
            pool: pool.to_string(),
            instances,
            capacity,
            active,
            utilization: f64::from(active) / f64::from(capacity.max(1)),
        })
    }

    pub fn get_queue_status(&self, pool: &str) -> Result<QueueStatus, ApiError> {
        if !self.registry.contains_pool(pool) {
            return Err(ApiError::NotFound(format!("pool: {pool}")));
        }
        Ok(QueueStatus {
            pool: pool.to_string(),
            depth: self.queue.depth(pool),
            dlq_depth: self.queue.dlq_depth(pool),
            next: self.queue.peek(pool, 3),
        })
    }

    pub fn dlq_list(&self, pool: &str, limit: usize) -> Result<Vec<DeadLetter>, ApiError> {
        if !self.registry.contains_pool(pool) {
            return Err(ApiError::NotFound(format!("pool: {pool}")));
        }
        Ok(self.queue.dlq_list(pool, limit))
    }

    pub fn dlq_get(&self, pool: &str, task_id: &TaskId) -> Result<DeadLetter, ApiError> {
        self.queue
            .dlq_get(pool, task_id)
            .ok_or_else(|| ApiError::NotFound(format!("dead letter for task: {task_id}")))
    }

    /// Move a dead letter back to its queue and reinstate the task record.
    pub fn dlq_retry(&self, pool: &str, task_id: &TaskId) -> Result<(), ApiError> {
        if self.queue.dlq_get(pool, task_id).is_none() {
            return Err(ApiError::NotFound(format!(
                "dead letter for task: {task_id}"
            )));
        }
        self.manager.reinstate(task_id)?;
        self.queue.dlq_retry(pool, task_id)?;
        info!(task_id = %task_id, pool, "dead letter retried");
        Ok(())
    }

    pub fn dlq_purge(&self, pool: &str) -> Result<usize, ApiError> {
        if !self.registry.contains_pool(pool) {
            return Err(ApiError::NotFound(format!("pool: {pool}")));
        }
        Ok(self.queue.dlq_purge(pool)?)
    }
}

fn estimated_wait(queue_position: usize) -> u64 {
    queue_position.saturating_sub(1) as u64 * AVERAGE_SCAN_SECONDS
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
