// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sw-api: the thin orchestrator facade consumed by the external
//! tool-dispatch layer.

pub mod error;
pub mod orchestrator;

pub use error::ApiError;
pub use orchestrator::{
    Orchestrator, PoolStatus, QueueStatus, ResultsRequest, SubmitReceipt, SubmitRequest,
    TaskStatus, TaskSummary,
};
