// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk task records: one directory per task.
//!
//! Layout: `<root>/<task_id>/task.json` (the record),
//! `report.nessus` (raw exported artifact, written once),
//! `worker.log` (lifecycle sidecar), `.lock` (write serialization).
//!
//! Record writes go through an fs2 advisory lock and a temp-file rename,
//! so readers never observe a torn document.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use sw_core::{IllegalTransition, Task, TaskId};
use thiserror::Error;
use tracing::warn;

const RECORD_FILE: &str = "task.json";
const ARTIFACT_FILE: &str = "report.nessus";
const WORKER_LOG_FILE: &str = "worker.log";
const LOCK_FILE: &str = ".lock";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("artifact not found for task: {0}")]
    ArtifactNotFound(TaskId),
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

/// Directory-per-task persistence.
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn task_dir(&self, id: &TaskId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Persist a brand-new record. The task directory must not exist yet.
    pub fn create(&self, task: &Task) -> Result<(), StoreError> {
        let dir = self.task_dir(&task.id);
        std::fs::create_dir_all(&dir)?;
        self.write(task)
    }

    pub fn read(&self, id: &TaskId) -> Result<Task, StoreError> {
        let path = self.task_dir(id).join(RECORD_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn exists(&self, id: &TaskId) -> bool {
        self.task_dir(id).join(RECORD_FILE).exists()
    }

    /// Rewrite the record under the task's write lock.
    pub fn write(&self, task: &Task) -> Result<(), StoreError> {
        let dir = self.task_dir(&task.id);
        let lock = File::create(dir.join(LOCK_FILE))?;
        lock.lock_exclusive()?;

        let result = (|| {
            let tmp = dir.join("task.json.tmp");
            std::fs::write(&tmp, serde_json::to_vec_pretty(task)?)?;
            std::fs::rename(&tmp, dir.join(RECORD_FILE))?;
            Ok(())
        })();

        if let Err(error) = fs2::FileExt::unlock(&lock) {
            warn!(task_id = %task.id, %error, "failed to release task lock");
        }
        result
    }

    /// Write the raw exported report. Written once on completion.
    pub fn write_artifact(&self, id: &TaskId, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = self.task_dir(id);
        if !dir.exists() {
            return Err(StoreError::NotFound(id.clone()));
        }
        let tmp = dir.join("report.nessus.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, dir.join(ARTIFACT_FILE))?;
        Ok(())
    }

    pub fn read_artifact(&self, id: &TaskId) -> Result<Vec<u8>, StoreError> {
        let path = self.task_dir(id).join(ARTIFACT_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::ArtifactNotFound(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn has_artifact(&self, id: &TaskId) -> bool {
        self.task_dir(id).join(ARTIFACT_FILE).exists()
    }

    /// Append one line to the task's worker log. Best-effort: a sidecar
    /// write failure never fails the scan.
    pub fn append_worker_log(&self, id: &TaskId, now_ms: u64, line: &str) {
        let stamp = chrono::DateTime::from_timestamp_millis(now_ms as i64)
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_default();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.task_dir(id).join(WORKER_LOG_FILE))
            .and_then(|mut f| writeln!(f, "[{stamp}] {line}"));
        if let Err(error) = result {
            warn!(task_id = %id, %error, "failed to append worker log");
        }
    }

    /// Every task id present on disk, in no particular order.
    pub fn list_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let mut ids = Vec::new();
        for dirent in std::fs::read_dir(&self.root)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_dir() {
                continue;
            }
            if dirent.path().join(RECORD_FILE).exists() {
                ids.push(TaskId::new(dirent.file_name().to_string_lossy()));
            }
        }
        Ok(ids)
    }

    /// Remove the task directory and everything in it.
    pub fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        let dir = self.task_dir(id);
        if !dir.exists() {
            return Err(StoreError::NotFound(id.clone()));
        }
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
