// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sw-queue: durable per-pool task queues with dead-letter semantics,
//! plus the idempotency store.

pub mod idempotency;
mod journal;
pub mod queue;

pub use idempotency::{fingerprint, IdempotencyError, IdempotencyStore, Reservation};
pub use queue::{DeadLetter, QueueEntry, QueueError, TaskQueue};
