// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type and its §7 classification.

use fl_adapters::{NotifyError, RuntimeError};
use fl_storage::{QueueError, StoreError};
use thiserror::Error;

/// Errors surfaced by engine operations and queue handlers
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    /// Rejected at creation; never stored (maps to HTTP 400).
    #[error("validation: {0}")]
    Validation(String),
    /// Maps to HTTP 404.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation not legal in the job's current state (maps to HTTP 409).
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl EngineError {
    /// Transient errors release the message for redelivery; the rest are
    /// reported and acked.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_transient(),
            EngineError::Queue(e) => e.is_transient(),
            EngineError::Runtime(e) => e.is_transient(),
            EngineError::Notify(e) => e.is_transient(),
            EngineError::Validation(_)
            | EngineError::NotFound(_)
            | EngineError::InvalidState(_) => false,
        }
    }
}
