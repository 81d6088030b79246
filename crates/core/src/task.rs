// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and state machine.

use crate::clock::Clock;
use crate::id::{TaskId, TraceId};
use crate::scan::ScanRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of scan a task drives against the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// No credentials; remote checks only.
    Untrusted,
    /// Credentialed checks with a normal account.
    Authenticated,
    /// Credentialed checks with an elevated account.
    AuthenticatedPrivileged,
}

impl ScanType {
    /// Whether this scan type expects credentialed checks to run.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            ScanType::Authenticated | ScanType::AuthenticatedPrivileged
        )
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanType::Untrusted => write!(f, "untrusted"),
            ScanType::Authenticated => write!(f, "authenticated"),
            ScanType::AuthenticatedPrivileged => write!(f, "authenticated_privileged"),
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl TaskState {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Timeout
        )
    }

    /// Whether moving from `self` to `to` is a legal transition.
    pub fn can_transition(&self, to: TaskState) -> bool {
        matches!(
            (self, to),
            (TaskState::Queued, TaskState::Running)
                | (TaskState::Queued, TaskState::Failed)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Timeout)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Queued => write!(f, "queued"),
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Timeout => write!(f, "timeout"),
        }
    }
}

/// Derived attribute of a finished scan: did credentialed checks work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationStatus {
    Success,
    Failed,
    Partial,
    NotApplicable,
    Unknown,
}

impl fmt::Display for AuthenticationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationStatus::Success => write!(f, "success"),
            AuthenticationStatus::Failed => write!(f, "failed"),
            AuthenticationStatus::Partial => write!(f, "partial"),
            AuthenticationStatus::NotApplicable => write!(f, "not_applicable"),
            AuthenticationStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Summary statistics derived from an exported report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub hosts: u64,
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub info: u64,
    /// Total non-info vulnerabilities.
    pub total: u64,
    pub artifact_bytes: u64,
}

/// Validator verdict recorded at a terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    pub authentication_status: AuthenticationStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ReportStats>,
}

/// Rejected attempt to move a task outside its state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal task transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// Configuration for creating a new task.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub id: TaskId,
    pub trace_id: TraceId,
    pub pool: String,
    pub scan_type: ScanType,
    pub request: ScanRequest,
}

/// One scan intent and everything observed about it.
///
/// The record is persisted as a single JSON document. Credentials inside
/// `request` never serialize their secret (see [`crate::scan::Credentials`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub trace_id: TraceId,
    pub pool: String,
    pub scan_type: ScanType,
    pub request: ScanRequest,
    /// Scanner instance assigned at dequeue, never before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Scanner-assigned scan id, set after create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner_scan_id: Option<i64>,
    pub state: TaskState,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Create a fresh task in `queued`.
    pub fn new<C: Clock>(config: TaskConfig, clock: &C) -> Self {
        Self {
            id: config.id,
            trace_id: config.trace_id,
            pool: config.pool,
            scan_type: config.scan_type,
            request: config.request,
            instance: None,
            scanner_scan_id: None,
            state: TaskState::Queued,
            created_at_ms: clock.epoch_ms(),
            started_at_ms: None,
            completed_at_ms: None,
            validation: None,
            error: None,
        }
    }

    /// Move to `to`, stamping `started_at_ms`/`completed_at_ms` as the
    /// transition demands. The record is untouched on rejection.
    pub fn transition(&mut self, to: TaskState, now_ms: u64) -> Result<(), IllegalTransition> {
        if !self.state.can_transition(to) {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }
        if to == TaskState::Running {
            self.started_at_ms = Some(now_ms);
        }
        if to.is_terminal() {
            self.completed_at_ms = Some(now_ms);
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
