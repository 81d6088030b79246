// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotency-key reservations with request fingerprinting.
//!
//! A key maps to at most one task for its TTL. The fingerprint ties the
//! key to the normalized request, so reusing a key for a semantically
//! different scan is a conflict rather than a silent dedup.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use sw_core::{ScanRequest, ScanType, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of an atomic insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The key is new; the caller's task owns it.
    Inserted,
    /// The key exists with the same fingerprint.
    Existing(TaskId),
    /// The key exists with a different fingerprint.
    Conflict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    task_id: TaskId,
    fingerprint: String,
    created_at_ms: u64,
}

/// TTL-bounded key → (task, fingerprint) map, persisted as one JSON file.
pub struct IdempotencyStore {
    path: Option<PathBuf>,
    ttl_ms: u64,
    entries: Mutex<HashMap<String, Record>>,
}

impl IdempotencyStore {
    /// Open a file-backed store. A missing file starts empty.
    pub fn open(path: &Path, ttl_ms: u64) -> Result<Self, IdempotencyError> {
        let entries = if path.exists() {
            serde_json::from_slice(&std::fs::read(path)?)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            ttl_ms,
            entries: Mutex::new(entries),
        })
    }

    pub fn in_memory(ttl_ms: u64) -> Self {
        Self {
            path: None,
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically claim `key` for `task_id`, or report the existing owner.
    pub fn reserve(
        &self,
        key: &str,
        task_id: &TaskId,
        fingerprint: &str,
        now_ms: u64,
    ) -> Result<Reservation, IdempotencyError> {
        let mut entries = self.entries.lock();
        entries.retain(|_, record| record.created_at_ms + self.ttl_ms > now_ms);

        if let Some(existing) = entries.get(key) {
            if existing.fingerprint == fingerprint {
                return Ok(Reservation::Existing(existing.task_id.clone()));
            }
            return Ok(Reservation::Conflict);
        }

        entries.insert(
            key.to_string(),
            Record {
                task_id: task_id.clone(),
                fingerprint: fingerprint.to_string(),
                created_at_ms: now_ms,
            },
        );
        self.persist(&entries)?;
        Ok(Reservation::Inserted)
    }

    fn persist(&self, entries: &HashMap<String, Record>) -> Result<(), IdempotencyError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// SHA-256 over the normalized request.
///
/// The canonical form is a JSON object with sorted keys; absent optionals
/// render as `null`. Credentials contribute identity only (username and
/// method), never the secret, so rotating a password does not change what
/// counts as "the same scan".
pub fn fingerprint(pool: &str, scan_type: ScanType, request: &ScanRequest) -> String {
    let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
    fields.insert("targets", Value::String(request.targets.clone()));
    fields.insert("name", Value::String(request.name.clone()));
    fields.insert(
        "description",
        request
            .description
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    fields.insert("pool", Value::String(pool.to_string()));
    fields.insert("scan_type", Value::String(scan_type.to_string()));
    fields.insert(
        "profile",
        request
            .profile
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    fields.insert(
        "custom_fields",
        match &request.custom_fields {
            Some(custom) => {
                let mut sorted = custom.clone();
                sorted.sort_unstable();
                Value::from(sorted)
            }
            None => Value::Null,
        },
    );
    fields.insert(
        "credentials",
        match &request.credentials {
            Some(creds) => {
                let mut identity: BTreeMap<String, Value> = BTreeMap::new();
                identity.insert("method".to_string(), Value::String(creds.method.to_string()));
                identity.insert("username".to_string(), Value::String(creds.username.clone()));
                Value::Object(identity.into_iter().collect())
            }
            None => Value::Null,
        },
    );

    let canonical = serde_json::to_string(&fields).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
#[path = "idempotency_tests.rs"]
mod tests;
