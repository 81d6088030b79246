// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sw-store: durable task records, the state-machine-enforcing manager,
//! and retention housekeeping.

pub mod cidr;
pub mod housekeeper;
pub mod manager;
pub mod store;

pub use housekeeper::{Housekeeper, RetentionWindows};
pub use manager::{TaskFilter, TaskManager};
pub use store::{StoreError, TaskStore};
