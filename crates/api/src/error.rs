// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing error taxonomy.

use sw_core::ProfileError;
use sw_queue::{IdempotencyError, QueueError};
use sw_results::{FilterError, PipelineError};
use sw_store::StoreError;
use thiserror::Error;

/// Errors surfaced to the tool-dispatch layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => ApiError::NotFound(format!("task: {id}")),
            StoreError::ArtifactNotFound(id) => {
                ApiError::NotFound(format!("results artifact for task: {id}"))
            }
            StoreError::IllegalTransition(e) => ApiError::Conflict(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(error: QueueError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl From<IdempotencyError> for ApiError {
    fn from(error: IdempotencyError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl From<ProfileError> for ApiError {
    fn from(error: ProfileError) -> Self {
        ApiError::InvalidArgument(error.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match error {
            // A corrupt stored artifact is our fault, not the caller's.
            PipelineError::Report(e) => ApiError::Internal(e.to_string()),
            PipelineError::Filter(FilterError::UnknownField(field)) => {
                ApiError::InvalidArgument(format!("unknown filter field: {field}"))
            }
            other => ApiError::InvalidArgument(other.to_string()),
        }
    }
}
