// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fake backend for tests.

use crate::{BackendError, BackendFactory, ScanSpec, ScannerBackend, StatusView};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use sw_core::InstanceConfig;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Authenticate,
    Create { name: String, has_credentials: bool },
    Launch(i64),
    Status(i64),
    Export(i64),
    Stop(i64),
    Delete(i64),
    Close,
}

#[derive(Debug, Clone)]
enum FakeFailure {
    Retryable(String),
    Fatal(String),
}

impl From<FakeFailure> for BackendError {
    fn from(failure: FakeFailure) -> Self {
        match failure {
            FakeFailure::Retryable(m) => BackendError::Retryable(m),
            FakeFailure::Fatal(m) => BackendError::Fatal(m),
        }
    }
}

#[derive(Default)]
struct FakeState {
    calls: Mutex<Vec<FakeCall>>,
    /// Status script, consumed front to back; empty means "completed".
    statuses: Mutex<VecDeque<StatusView>>,
    export_bytes: Mutex<Vec<u8>>,
    /// Pending failures per operation name.
    failures: Mutex<HashMap<&'static str, VecDeque<FakeFailure>>>,
    next_scan_id: AtomicI64,
}

/// Scripted in-memory scanner.
///
/// Every status poll consumes one scripted entry; once the script runs
/// dry the scan reports `completed`. Operations fail in order from the
/// failure queues pushed by the test.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<FakeState>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        let state = FakeState {
            next_scan_id: AtomicI64::new(1_000),
            ..Default::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub fn push_status(&self, status: &str, progress: Option<u8>) {
        self.state.statuses.lock().push_back(StatusView {
            status: status.to_string(),
            progress,
        });
    }

    pub fn set_export(&self, bytes: impl Into<Vec<u8>>) {
        *self.state.export_bytes.lock() = bytes.into();
    }

    pub fn fail_next_retryable(&self, op: &'static str, message: &str) {
        self.state
            .failures
            .lock()
            .entry(op)
            .or_default()
            .push_back(FakeFailure::Retryable(message.to_string()));
    }

    pub fn fail_next_fatal(&self, op: &'static str, message: &str) {
        self.state
            .failures
            .lock()
            .entry(op)
            .or_default()
            .push_back(FakeFailure::Fatal(message.to_string()));
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.calls.lock().clone()
    }

    pub fn stop_requested(&self) -> bool {
        self.state
            .calls
            .lock()
            .iter()
            .any(|call| matches!(call, FakeCall::Stop(_)))
    }

    fn record(&self, call: FakeCall) {
        self.state.calls.lock().push(call);
    }

    fn take_failure(&self, op: &'static str) -> Option<FakeFailure> {
        self.state
            .failures
            .lock()
            .get_mut(op)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl ScannerBackend for FakeBackend {
    async fn authenticate(&self) -> Result<(), BackendError> {
        self.record(FakeCall::Authenticate);
        match self.take_failure("authenticate") {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    async fn create(&self, spec: &ScanSpec) -> Result<i64, BackendError> {
        self.record(FakeCall::Create {
            name: spec.name.clone(),
            has_credentials: spec.credentials.is_some(),
        });
        if let Some(failure) = self.take_failure("create") {
            return Err(failure.into());
        }
        Ok(self.state.next_scan_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn launch(&self, scan_id: i64) -> Result<String, BackendError> {
        self.record(FakeCall::Launch(scan_id));
        if let Some(failure) = self.take_failure("launch") {
            return Err(failure.into());
        }
        Ok(format!("launch-{scan_id}"))
    }

    async fn status(&self, scan_id: i64) -> Result<StatusView, BackendError> {
        self.record(FakeCall::Status(scan_id));
        if let Some(failure) = self.take_failure("status") {
            return Err(failure.into());
        }
        Ok(self
            .state
            .statuses
            .lock()
            .pop_front()
            .unwrap_or(StatusView {
                status: "completed".to_string(),
                progress: Some(100),
            }))
    }

    async fn export(&self, scan_id: i64, _format: &str) -> Result<Vec<u8>, BackendError> {
        self.record(FakeCall::Export(scan_id));
        if let Some(failure) = self.take_failure("export") {
            return Err(failure.into());
        }
        Ok(self.state.export_bytes.lock().clone())
    }

    async fn stop(&self, scan_id: i64) -> Result<(), BackendError> {
        self.record(FakeCall::Stop(scan_id));
        Ok(())
    }

    async fn delete(&self, scan_id: i64) -> Result<(), BackendError> {
        self.record(FakeCall::Delete(scan_id));
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.record(FakeCall::Close);
        Ok(())
    }
}

#[derive(Default)]
struct FactoryState {
    backends: Mutex<HashMap<String, FakeBackend>>,
    connects: Mutex<Vec<String>>,
}

/// Hands out one shared [`FakeBackend`] per `pool/instance`, so tests can
/// script an instance before (or after) the worker connects to it.
#[derive(Clone, Default)]
pub struct FakeBackendFactory {
    state: Arc<FactoryState>,
}

impl FakeBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend_for(&self, pool: &str, instance_id: &str) -> FakeBackend {
        self.state
            .backends
            .lock()
            .entry(format!("{pool}/{instance_id}"))
            .or_insert_with(FakeBackend::new)
            .clone()
    }

    /// Every `pool/instance` connect in order.
    pub fn connects(&self) -> Vec<String> {
        self.state.connects.lock().clone()
    }
}

impl BackendFactory for FakeBackendFactory {
    type Backend = FakeBackend;

    fn connect(
        &self,
        pool: &str,
        instance_id: &str,
        _config: &InstanceConfig,
    ) -> Result<Self::Backend, BackendError> {
        self.state
            .connects
            .lock()
            .push(format!("{pool}/{instance_id}"));
        Ok(self.backend_for(pool, instance_id))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
