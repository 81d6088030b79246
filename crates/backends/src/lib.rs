// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sw-backends: scanner adapters.
//!
//! The orchestration core sees one scanner instance through the
//! [`ScannerBackend`] trait; a [`BackendFactory`] turns a declarative
//! instance config into a live adapter owning its transport session.

mod nessus;
mod traced;

pub use nessus::{NessusBackend, NessusBackendFactory};
pub use traced::TracedBackend;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBackend, FakeBackendFactory, FakeCall};

use async_trait::async_trait;
use sw_core::{Credentials, InstanceConfig, ScanType};
use thiserror::Error;

/// Errors from backend operations, split by retry safety.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transient: network hiccup, scanner 5xx, export not ready.
    #[error("retryable backend error: {0}")]
    Retryable(String),
    /// Permanent for this scan: bad request, auth rejection, 4xx.
    #[error("fatal backend error: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Retryable(_))
    }
}

/// Everything a backend needs to create one scan.
///
/// Credentials ride along in memory only; adapters turn them into the
/// wire shape just in time and drop them after create.
#[derive(Debug, Clone)]
pub struct ScanSpec {
    pub name: String,
    pub description: Option<String>,
    pub targets: String,
    pub scan_type: ScanType,
    pub credentials: Option<Credentials>,
}

/// Raw status as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub status: String,
    pub progress: Option<u8>,
}

/// Core-side classification of a backend status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Still spinning up; keep polling.
    Starting,
    Running,
    Completed,
    /// Canceled, stopped, or aborted on the scanner side.
    Failed,
}

/// Map a backend status string to the phase the worker acts on.
///
/// Unknown strings keep the poll loop alive rather than failing a scan
/// on a vocabulary mismatch.
pub fn classify_status(raw: &str) -> ScanPhase {
    match raw {
        "pending" | "empty" => ScanPhase::Starting,
        "running" | "paused" => ScanPhase::Running,
        "completed" => ScanPhase::Completed,
        "canceled" | "cancelled" | "stopped" | "aborted" => ScanPhase::Failed,
        _ => ScanPhase::Running,
    }
}

/// One scanner instance: authenticate, drive a scan through its
/// lifecycle, export the report, clean up.
#[async_trait]
pub trait ScannerBackend: Send + Sync {
    /// Establish the transport session. Idempotent.
    async fn authenticate(&self) -> Result<(), BackendError>;

    /// Create a scan; returns the scanner-assigned scan id.
    async fn create(&self, spec: &ScanSpec) -> Result<i64, BackendError>;

    /// Start the scan; returns the launch uuid.
    async fn launch(&self, scan_id: i64) -> Result<String, BackendError>;

    async fn status(&self, scan_id: i64) -> Result<StatusView, BackendError>;

    /// Export the finished scan in the given format (`"nessus"`).
    async fn export(&self, scan_id: i64, format: &str) -> Result<Vec<u8>, BackendError>;

    /// Best-effort stop; an already-stopped scan is success.
    async fn stop(&self, scan_id: i64) -> Result<(), BackendError>;

    /// Remove the scan from the scanner.
    async fn delete(&self, scan_id: i64) -> Result<(), BackendError>;

    /// Release the transport session.
    async fn close(&self) -> Result<(), BackendError>;
}

/// Builds adapters from declarative instance configs.
pub trait BackendFactory: Send + Sync + 'static {
    type Backend: ScannerBackend;

    fn connect(
        &self,
        pool: &str,
        instance_id: &str,
        config: &InstanceConfig,
    ) -> Result<Self::Backend, BackendError>;
}
