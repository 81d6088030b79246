// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL operation journal backing the task queue.
//!
//! Every queue mutation appends one line of JSON. Replay on open rebuilds
//! the in-memory state; once the op count passes a threshold the journal
//! is rewritten as the current state only.

use crate::queue::{DeadLetter, QueueEntry};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use sw_core::TaskId;
use thiserror::Error;
use tracing::warn;

/// Rewrite the journal once this many ops have accumulated.
const COMPACT_THRESHOLD: usize = 4_096;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One journaled queue mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalOp {
    Enqueue { entry: QueueEntry },
    Dequeue { pool: String, task_id: TaskId },
    DeadLetter { letter: DeadLetter },
    DlqRetry { pool: String, task_id: TaskId },
    DlqPurge { pool: String },
}

pub struct Journal {
    file: File,
    path: PathBuf,
    op_count: usize,
}

impl Journal {
    /// Open (or create) the journal, returning the replayable ops.
    ///
    /// A corrupt line ends replay at that point: everything before it is
    /// kept, the tail is discarded on the next compaction.
    pub fn open(path: &Path) -> Result<(Self, Vec<JournalOp>), JournalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut ops = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalOp>(&line) {
                    Ok(op) => ops.push(op),
                    Err(error) => {
                        warn!(path = %path.display(), lineno, %error, "corrupt journal line, truncating replay");
                        break;
                    }
                }
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok((
            Self {
                file,
                path: path.to_path_buf(),
                op_count: ops.len(),
            },
            ops,
        ))
    }

    pub fn append(&mut self, op: &JournalOp) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(op)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        self.op_count += 1;
        Ok(())
    }

    pub fn wants_compaction(&self) -> bool {
        self.op_count >= COMPACT_THRESHOLD
    }

    /// Rewrite the journal to hold only `ops` (the current state).
    pub fn compact(&mut self, ops: &[JournalOp]) -> Result<(), JournalError> {
        let tmp = self.path.with_extension("journal.tmp");
        {
            let mut out = File::create(&tmp)?;
            for op in ops {
                let mut line = serde_json::to_vec(op)?;
                line.push(b'\n');
                out.write_all(&line)?;
            }
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.op_count = ops.len();
        Ok(())
    }
}
