// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-pool FIFO task queues with dead-letter queues.
//!
//! One consumer per pool pops entries with a bounded blocking wait; the
//! dequeue itself acknowledges the entry. The DLQ is a separate structure
//! ordered by failure time; moving entries back is a deliberate
//! administrative action.

use crate::journal::{Journal, JournalError, JournalOp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sw_core::TaskId;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::info;

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue journal error: {0}")]
    Journal(#[from] JournalError),
}

/// Serialized task descriptor waiting in a pool's FIFO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task_id: TaskId,
    pub pool: String,
    pub enqueued_at_ms: u64,
    /// Times this entry has been re-enqueued after a capacity rejection.
    #[serde(default)]
    pub attempts: u32,
}

impl QueueEntry {
    pub fn new(task_id: TaskId, pool: impl Into<String>, now_ms: u64) -> Self {
        Self {
            task_id,
            pool: pool.into(),
            enqueued_at_ms: now_ms,
            attempts: 0,
        }
    }

    /// Copy for a tail re-enqueue after a transient rejection.
    pub fn requeued(&self, now_ms: u64) -> Self {
        Self {
            task_id: self.task_id.clone(),
            pool: self.pool.clone(),
            enqueued_at_ms: now_ms,
            attempts: self.attempts + 1,
        }
    }
}

/// A failed entry retained for inspection and manual retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub entry: QueueEntry,
    pub reason: String,
    pub failed_at_ms: u64,
}

#[derive(Default)]
struct PoolQueue {
    main: VecDeque<QueueEntry>,
    /// Ordered by `failed_at_ms` ascending.
    dlq: Vec<DeadLetter>,
    notify: Arc<Notify>,
}

struct QueueState {
    pools: HashMap<String, PoolQueue>,
    journal: Option<Journal>,
}

impl QueueState {
    fn pool_mut(&mut self, pool: &str) -> &mut PoolQueue {
        self.pools.entry(pool.to_string()).or_default()
    }

    fn record(&mut self, op: JournalOp) -> Result<(), QueueError> {
        let Some(journal) = self.journal.as_mut() else {
            return Ok(());
        };
        journal.append(&op)?;
        if journal.wants_compaction() {
            let snapshot = snapshot_ops(&self.pools);
            if let Some(journal) = self.journal.as_mut() {
                journal.compact(&snapshot)?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::Enqueue { entry } => {
                let pool = self.pool_mut(&entry.pool);
                pool.main.push_back(entry);
            }
            JournalOp::Dequeue { pool, task_id } => {
                let pool = self.pool_mut(&pool);
                if let Some(pos) = pool.main.iter().position(|e| e.task_id == task_id) {
                    pool.main.remove(pos);
                }
            }
            JournalOp::DeadLetter { letter } => {
                let pool = self.pool_mut(&letter.entry.pool);
                let at = pool
                    .dlq
                    .partition_point(|d| d.failed_at_ms <= letter.failed_at_ms);
                pool.dlq.insert(at, letter);
            }
            JournalOp::DlqRetry { pool, task_id } => {
                let pool = self.pool_mut(&pool);
                if let Some(pos) = pool.dlq.iter().position(|d| d.entry.task_id == task_id) {
                    let letter = pool.dlq.remove(pos);
                    let mut entry = letter.entry;
                    entry.attempts = 0;
                    pool.main.push_back(entry);
                }
            }
            JournalOp::DlqPurge { pool } => {
                self.pool_mut(&pool).dlq.clear();
            }
        }
    }
}

fn snapshot_ops(pools: &HashMap<String, PoolQueue>) -> Vec<JournalOp> {
    let mut ops = Vec::new();
    for pool in pools.values() {
        for entry in &pool.main {
            ops.push(JournalOp::Enqueue {
                entry: entry.clone(),
            });
        }
        for letter in &pool.dlq {
            ops.push(JournalOp::DeadLetter {
                letter: letter.clone(),
            });
        }
    }
    ops
}

/// Durable per-pool FIFO queues plus DLQs.
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    /// Open a journal-backed queue, replaying any surviving entries.
    pub fn open(journal_path: &Path) -> Result<Self, QueueError> {
        let (journal, ops) = Journal::open(journal_path)?;
        let mut state = QueueState {
            pools: HashMap::new(),
            journal: None,
        };
        let replayed = ops.len();
        for op in ops {
            state.apply(op);
        }
        state.journal = Some(journal);
        if replayed > 0 {
            info!(replayed, "queue journal replayed");
        }
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Volatile queue for tests and embedded use.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pools: HashMap::new(),
                journal: None,
            }),
        }
    }

    /// Append to the pool's tail and wake a blocked consumer.
    pub fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        state.record(JournalOp::Enqueue {
            entry: entry.clone(),
        })?;
        let pool = state.pool_mut(&entry.pool);
        pool.main.push_back(entry);
        let notify = pool.notify.clone();
        drop(state);
        notify.notify_one();
        Ok(())
    }

    /// Remove and return the head entry, blocking up to `timeout`.
    pub async fn dequeue(
        &self,
        pool: &str,
        timeout: Duration,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = {
                let mut state = self.state.lock();
                if let Some(entry) = pop_front(&mut state, pool)? {
                    return Ok(Some(entry));
                }
                state.pool_mut(pool).notify.clone()
            };
            if tokio::time::timeout_at(deadline, notify.notified())
                .await
                .is_err()
            {
                let mut state = self.state.lock();
                return pop_front(&mut state, pool);
            }
        }
    }

    /// Non-blocking pop.
    pub fn try_dequeue(&self, pool: &str) -> Result<Option<QueueEntry>, QueueError> {
        let mut state = self.state.lock();
        pop_front(&mut state, pool)
    }

    pub fn depth(&self, pool: &str) -> usize {
        self.state
            .lock()
            .pools
            .get(pool)
            .map(|p| p.main.len())
            .unwrap_or(0)
    }

    /// The first `n` entries without removing them.
    pub fn peek(&self, pool: &str, n: usize) -> Vec<QueueEntry> {
        self.state
            .lock()
            .pools
            .get(pool)
            .map(|p| p.main.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    /// Position of a task in the pool FIFO (1-based), if queued.
    pub fn position(&self, pool: &str, task_id: &TaskId) -> Option<usize> {
        self.state
            .lock()
            .pools
            .get(pool)
            .and_then(|p| p.main.iter().position(|e| &e.task_id == task_id))
            .map(|idx| idx + 1)
    }

    /// Move a failed entry to the pool's DLQ, ordered by failure time.
    pub fn dead_letter(
        &self,
        entry: QueueEntry,
        reason: impl Into<String>,
        now_ms: u64,
    ) -> Result<(), QueueError> {
        let letter = DeadLetter {
            entry,
            reason: reason.into(),
            failed_at_ms: now_ms,
        };
        let mut state = self.state.lock();
        state.record(JournalOp::DeadLetter {
            letter: letter.clone(),
        })?;
        state.apply(JournalOp::DeadLetter { letter });
        Ok(())
    }

    pub fn dlq_depth(&self, pool: &str) -> usize {
        self.state
            .lock()
            .pools
            .get(pool)
            .map(|p| p.dlq.len())
            .unwrap_or(0)
    }

    pub fn dlq_list(&self, pool: &str, limit: usize) -> Vec<DeadLetter> {
        self.state
            .lock()
            .pools
            .get(pool)
            .map(|p| p.dlq.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn dlq_get(&self, pool: &str, task_id: &TaskId) -> Option<DeadLetter> {
        self.state
            .lock()
            .pools
            .get(pool)
            .and_then(|p| p.dlq.iter().find(|d| &d.entry.task_id == task_id))
            .cloned()
    }

    /// Move a dead letter back to the main queue tail, clearing its
    /// failure annotations. Returns false when the task is not in the DLQ.
    pub fn dlq_retry(&self, pool: &str, task_id: &TaskId) -> Result<bool, QueueError> {
        let mut state = self.state.lock();
        let found = state
            .pools
            .get(pool)
            .is_some_and(|p| p.dlq.iter().any(|d| &d.entry.task_id == task_id));
        if !found {
            return Ok(false);
        }
        let op = JournalOp::DlqRetry {
            pool: pool.to_string(),
            task_id: task_id.clone(),
        };
        state.record(op.clone())?;
        state.apply(op);
        let notify = state.pool_mut(pool).notify.clone();
        drop(state);
        notify.notify_one();
        Ok(true)
    }

    /// Drop every dead letter in the pool. Returns how many were removed.
    pub fn dlq_purge(&self, pool: &str) -> Result<usize, QueueError> {
        let mut state = self.state.lock();
        let purged = state.pools.get(pool).map(|p| p.dlq.len()).unwrap_or(0);
        if purged > 0 {
            let op = JournalOp::DlqPurge {
                pool: pool.to_string(),
            };
            state.record(op.clone())?;
            state.apply(op);
        }
        Ok(purged)
    }
}

fn pop_front(state: &mut QueueState, pool: &str) -> Result<Option<QueueEntry>, QueueError> {
    let Some(entry) = state.pool_mut(pool).main.front().cloned() else {
        return Ok(None);
    };
    state.record(JournalOp::Dequeue {
        pool: pool.to_string(),
        task_id: entry.task_id.clone(),
    })?;
    state.pool_mut(pool).main.pop_front();
    Ok(Some(entry))
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
