// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TaskManager: the one place task status may change.
//!
//! Every status mutation funnels through here so the state machine is
//! enforced exactly once and record writes stay serialized per task.
//! Progress is a transient overlay: it lives in memory only and is lost
//! (harmlessly) on restart.

use crate::cidr::target_matches;
use crate::store::{StoreError, TaskStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use sw_core::{Clock, IllegalTransition, Task, TaskConfig, TaskId, TaskState, Validation};
use tracing::info;

/// Criteria for `list`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskState>,
    pub pool: Option<String>,
    /// IP / CIDR / range / hostname fragment, matched against targets.
    pub target: Option<String>,
    /// Zero means unlimited.
    pub limit: usize,
}

pub struct TaskManager<C: Clock> {
    store: TaskStore,
    progress: Mutex<HashMap<TaskId, u8>>,
    clock: C,
}

impl<C: Clock> TaskManager<C> {
    pub fn new(store: TaskStore, clock: C) -> Self {
        Self {
            store,
            progress: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Create a task in `queued` and persist it.
    pub fn create(&self, config: TaskConfig) -> Result<Task, StoreError> {
        let task = Task::new(config, &self.clock);
        self.store.create(&task)?;
        info!(task_id = %task.id, pool = %task.pool, "task created");
        Ok(task)
    }

    /// Read one task, overlaying transient progress while running.
    pub fn get(&self, id: &TaskId) -> Result<(Task, Option<u8>), StoreError> {
        let task = self.store.read(id)?;
        let progress = (task.state == TaskState::Running)
            .then(|| self.progress.lock().get(id).copied())
            .flatten();
        Ok((task, progress))
    }

    /// Read every task passing the filter, newest first.
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut tasks = Vec::new();
        for id in self.store.list_ids()? {
            let Ok(task) = self.store.read(&id) else {
                // Half-written record mid-create; skip rather than fail the listing.
                continue;
            };
            if let Some(status) = filter.status {
                if task.state != status {
                    continue;
                }
            }
            if let Some(pool) = &filter.pool {
                if &task.pool != pool {
                    continue;
                }
            }
            if let Some(target) = &filter.target {
                if !target_matches(target, &task.request.targets) {
                    continue;
                }
            }
            tasks.push(task);
        }
        tasks.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        if filter.limit > 0 {
            tasks.truncate(filter.limit);
        }
        Ok(tasks)
    }

    pub fn mark_running(&self, id: &TaskId) -> Result<Task, StoreError> {
        self.transition(id, TaskState::Running, |_| {})
    }

    /// Record which instance the scan landed on.
    pub fn set_instance(&self, id: &TaskId, instance: &str) -> Result<(), StoreError> {
        let mut task = self.store.read(id)?;
        task.instance = Some(instance.to_string());
        self.store.write(&task)
    }

    /// Record the scanner-assigned scan id after create.
    pub fn set_scanner_scan_id(&self, id: &TaskId, scan_id: i64) -> Result<(), StoreError> {
        let mut task = self.store.read(id)?;
        task.scanner_scan_id = Some(scan_id);
        self.store.write(&task)
    }

    /// Transient, in-memory only.
    pub fn update_progress(&self, id: &TaskId, percent: u8) {
        self.progress.lock().insert(id.clone(), percent.min(100));
    }

    pub fn mark_completed(&self, id: &TaskId, validation: Validation) -> Result<Task, StoreError> {
        self.transition(id, TaskState::Completed, |task| {
            task.validation = Some(validation);
        })
    }

    pub fn mark_failed(
        &self,
        id: &TaskId,
        error: impl Into<String>,
        validation: Option<Validation>,
    ) -> Result<Task, StoreError> {
        let error = error.into();
        self.transition(id, TaskState::Failed, move |task| {
            task.error = Some(error);
            if validation.is_some() {
                task.validation = validation;
            }
        })
    }

    pub fn mark_timeout(&self, id: &TaskId) -> Result<Task, StoreError> {
        self.transition(id, TaskState::Timeout, |task| {
            task.error = Some("scan deadline exceeded".to_string());
        })
    }

    /// Administrative resurrection backing dead-letter retry: a failed or
    /// timed-out task returns to `queued` with every failure annotation
    /// cleared. This is deliberately outside the worker-driven state
    /// machine and is only reachable through operator action.
    pub fn reinstate(&self, id: &TaskId) -> Result<Task, StoreError> {
        let mut task = self.store.read(id)?;
        if !matches!(task.state, TaskState::Failed | TaskState::Timeout) {
            return Err(StoreError::IllegalTransition(IllegalTransition {
                from: task.state,
                to: TaskState::Queued,
            }));
        }
        let from = task.state;
        task.state = TaskState::Queued;
        task.started_at_ms = None;
        task.completed_at_ms = None;
        task.error = None;
        task.validation = None;
        task.instance = None;
        task.scanner_scan_id = None;
        self.store.write(&task)?;
        info!(task_id = %id, %from, "task reinstated for retry");
        Ok(task)
    }

    fn transition(
        &self,
        id: &TaskId,
        to: TaskState,
        annotate: impl FnOnce(&mut Task),
    ) -> Result<Task, StoreError> {
        let mut task = self.store.read(id)?;
        let from = task.state;
        task.transition(to, self.clock.epoch_ms())?;
        annotate(&mut task);
        self.store.write(&task)?;
        if to.is_terminal() {
            self.progress.lock().remove(id);
        }
        info!(task_id = %id, %from, %to, "task transition");
        Ok(task)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
