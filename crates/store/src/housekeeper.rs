// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention sweep over terminal task directories.

use crate::manager::TaskManager;
use crate::store::StoreError;
use std::sync::Arc;
use sw_core::{Clock, RetentionConfig, TaskState};
use tracing::{info, warn};

const DAY_MS: u64 = 86_400_000;

/// Per-terminal-state retention windows in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RetentionWindows {
    pub completed_ms: u64,
    pub failed_ms: u64,
    pub timeout_ms: u64,
}

impl From<&RetentionConfig> for RetentionWindows {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            completed_ms: config.completed_days * DAY_MS,
            failed_ms: config.failed_days * DAY_MS,
            timeout_ms: config.timeout_days * DAY_MS,
        }
    }
}

/// Deletes task directories whose terminal state has aged out.
///
/// Queued and running tasks are never removed, whatever their age.
pub struct Housekeeper<C: Clock> {
    manager: Arc<TaskManager<C>>,
    windows: RetentionWindows,
    clock: C,
}

impl<C: Clock> Housekeeper<C> {
    pub fn new(manager: Arc<TaskManager<C>>, windows: RetentionWindows, clock: C) -> Self {
        Self {
            manager,
            windows,
            clock,
        }
    }

    /// One pass; returns how many task directories were removed.
    pub fn sweep(&self) -> Result<usize, StoreError> {
        let now_ms = self.clock.epoch_ms();
        let mut removed = 0;
        for id in self.manager.store().list_ids()? {
            let task = match self.manager.store().read(&id) {
                Ok(task) => task,
                Err(error) => {
                    warn!(task_id = %id, %error, "skipping unreadable task record");
                    continue;
                }
            };
            let window_ms = match task.state {
                TaskState::Completed => self.windows.completed_ms,
                TaskState::Failed => self.windows.failed_ms,
                TaskState::Timeout => self.windows.timeout_ms,
                TaskState::Queued | TaskState::Running => continue,
            };
            let finished_at = task.completed_at_ms.unwrap_or(task.created_at_ms);
            if finished_at + window_ms <= now_ms {
                match self.manager.store().delete(&id) {
                    Ok(()) => removed += 1,
                    Err(error) => warn!(task_id = %id, %error, "retention delete failed"),
                }
            }
        }
        if removed > 0 {
            info!(removed, "retention sweep");
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "housekeeper_tests.rs"]
mod tests;
