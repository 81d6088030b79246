// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced backend wrapper for consistent observability.

use crate::{BackendError, ScanSpec, ScannerBackend, StatusView};
use async_trait::async_trait;
use tracing::Instrument;

/// Wrapper that adds tracing to any ScannerBackend.
pub struct TracedBackend<B> {
    inner: B,
    /// `pool/instance`, attached to every span.
    label: String,
}

impl<B> TracedBackend<B> {
    pub fn new(inner: B, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }
}

#[async_trait]
impl<B: ScannerBackend> ScannerBackend for TracedBackend<B> {
    async fn authenticate(&self) -> Result<(), BackendError> {
        async {
            let start = std::time::Instant::now();
            let result = self.inner.authenticate().await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => tracing::info!(elapsed_ms, "authenticated"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "authentication failed"),
            }
            result
        }
        .instrument(tracing::info_span!("backend.authenticate", instance = %self.label))
        .await
    }

    async fn create(&self, spec: &ScanSpec) -> Result<i64, BackendError> {
        async {
            tracing::info!(name = %spec.name, scan_type = %spec.scan_type, "creating scan");
            let result = self.inner.create(spec).await;
            match &result {
                Ok(id) => tracing::info!(scan_id = id, "scan created"),
                Err(e) => tracing::error!(error = %e, "create failed"),
            }
            result
        }
        .instrument(tracing::info_span!("backend.create", instance = %self.label))
        .await
    }

    async fn launch(&self, scan_id: i64) -> Result<String, BackendError> {
        async {
            let result = self.inner.launch(scan_id).await;
            match &result {
                Ok(uuid) => tracing::info!(scan_id, launch_uuid = %uuid, "scan launched"),
                Err(e) => tracing::error!(scan_id, error = %e, "launch failed"),
            }
            result
        }
        .instrument(tracing::info_span!("backend.launch", instance = %self.label))
        .await
    }

    async fn status(&self, scan_id: i64) -> Result<StatusView, BackendError> {
        let result = self.inner.status(scan_id).await;
        tracing::info_span!("backend.status", instance = %self.label, scan_id).in_scope(|| {
            match &result {
                Ok(view) => {
                    tracing::debug!(status = %view.status, progress = ?view.progress, "polled")
                }
                Err(e) => tracing::warn!(error = %e, "status poll failed"),
            }
        });
        result
    }

    async fn export(&self, scan_id: i64, format: &str) -> Result<Vec<u8>, BackendError> {
        async {
            let start = std::time::Instant::now();
            let result = self.inner.export(scan_id, format).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(bytes) => tracing::info!(scan_id, elapsed_ms, bytes = bytes.len(), "exported"),
                Err(e) => tracing::error!(scan_id, elapsed_ms, error = %e, "export failed"),
            }
            result
        }
        .instrument(tracing::info_span!("backend.export", instance = %self.label, format))
        .await
    }

    async fn stop(&self, scan_id: i64) -> Result<(), BackendError> {
        let result = self.inner.stop(scan_id).await;
        tracing::info_span!("backend.stop", instance = %self.label, scan_id).in_scope(|| {
            match &result {
                Ok(()) => tracing::info!("stopped"),
                Err(e) => tracing::warn!(error = %e, "stop failed (may be expected)"),
            }
        });
        result
    }

    async fn delete(&self, scan_id: i64) -> Result<(), BackendError> {
        let result = self.inner.delete(scan_id).await;
        if let Err(ref e) = result {
            tracing::warn!(instance = %self.label, scan_id, error = %e, "delete failed");
        }
        result
    }

    async fn close(&self) -> Result<(), BackendError> {
        let result = self.inner.close().await;
        if let Err(ref e) = result {
            tracing::warn!(instance = %self.label, error = %e, "close failed");
        }
        result
    }
}
