// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tasks: named logical units grouping jobs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from task validation
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task id may not be empty")]
    EmptyId,
    #[error("task id {0:?} contains invalid characters (allowed: A-Z a-z 0-9 . _ -)")]
    InvalidId(String),
}

/// A named logical unit; container for jobs sharing pool-matching rules.
///
/// Tasks are created implicitly on first job submission and are append-only
/// in practice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub created_at_ms: u64,
    pub last_modified_at_ms: u64,
}

impl Task {
    pub fn new(task_id: impl Into<String>, now_ms: u64) -> Result<Self, TaskError> {
        let task_id = task_id.into();
        validate_task_id(&task_id)?;
        Ok(Self { task_id, created_at_ms: now_ms, last_modified_at_ms: now_ms })
    }
}

/// Task ids are client-chosen and appear in container names and pool-matching
/// regexes, so the alphabet is kept tight.
pub fn validate_task_id(task_id: &str) -> Result<(), TaskError> {
    if task_id.is_empty() {
        return Err(TaskError::EmptyId);
    }
    let ok = task_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-');
    if !ok {
        return Err(TaskError::InvalidId(task_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
