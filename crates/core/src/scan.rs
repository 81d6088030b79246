// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan request payload and credentials.

use crate::id::TaskId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How the scanner authenticates to the targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMethod {
    #[default]
    Password,
    SshKey,
}

impl fmt::Display for CredentialMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialMethod::Password => write!(f, "password"),
            CredentialMethod::SshKey => write!(f, "ssh_key"),
        }
    }
}

/// Target credentials for authenticated scans.
///
/// The secret lives in memory only: it is skipped on serialization (so it
/// never reaches a persisted task record) and redacted from `Debug` output
/// (so it never reaches a log line).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub method: CredentialMethod,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("method", &self.method)
            .finish()
    }
}

/// Client-supplied scan intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Comma-separated IPs, dash ranges, CIDRs, and hostnames.
    pub targets: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    /// Named schema profile for result reads; resolved lazily.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<String>>,
}

/// In-memory holding pen for scan secrets.
///
/// Task records and queue journals persist credential identity only; the
/// secret stays here from submission until the scan no longer needs it.
/// A daemon restart empties the vault, so an authenticated task retried
/// after a restart must be resubmitted with fresh credentials.
#[derive(Default)]
pub struct CredentialVault {
    entries: Mutex<HashMap<TaskId, Credentials>>,
}

impl CredentialVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, task_id: TaskId, credentials: Credentials) {
        self.entries.lock().insert(task_id, credentials);
    }

    pub fn get(&self, task_id: &TaskId) -> Option<Credentials> {
        self.entries.lock().get(task_id).cloned()
    }

    pub fn discard(&self, task_id: &TaskId) {
        self.entries.lock().remove(task_id);
    }
}
