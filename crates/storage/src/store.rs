// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable store interface.
//!
//! Tasks and jobs are documents; executions are embedded in their job.
//! Writers racing on the same execution are serialized by compare-and-set on
//! `(execution_id, status)`: the losing writer gets [`StoreError::Conflict`]
//! carrying the status it lost to, observes it, and becomes a no-op.

use async_trait::async_trait;
use fl_core::{Execution, ExecutionId, ExecutionStatus, Job, JobId, Task};
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// A compare-and-set lost the race; `actual` is the status that won.
    #[error("conflict: expected {expected}, found {actual}")]
    Conflict { expected: String, actual: ExecutionStatus },
    /// The job already has an execution in a non-terminal state.
    #[error("job {0} already has an active execution")]
    ActiveExecution(JobId),
    /// The job's attempt ceiling has been reached.
    #[error("job {0} has no attempts remaining")]
    AttemptsExhausted(JobId),
    #[error("invalid: {0}")]
    Invalid(String),
    /// The backend is unreachable or timing out.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient errors release the owning queue message for redelivery;
    /// everything else mutates state or is dropped.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Targeted update applied to an execution under compare-and-set.
///
/// `status` is the transition target; the remaining fields are set only when
/// present.
#[derive(Debug, Clone, Default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub container_id: Option<String>,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub exit_code: Option<i64>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error: Option<String>,
}

impl ExecutionUpdate {
    /// Update that transitions to `status`.
    pub fn to(status: ExecutionStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    fl_core::setters! {
        option {
            container_id: String,
            started_at_ms: u64,
            finished_at_ms: u64,
            exit_code: i64,
            stdout: String,
            stderr: String,
            error: String,
        }
    }

    pub(crate) fn apply(self, execution: &mut Execution) {
        if let Some(status) = self.status {
            execution.status = status;
        }
        if let Some(v) = self.container_id {
            execution.container_id = Some(v);
        }
        if let Some(v) = self.started_at_ms {
            execution.started_at_ms = Some(v);
        }
        if let Some(v) = self.finished_at_ms {
            execution.finished_at_ms = Some(v);
        }
        if let Some(v) = self.exit_code {
            execution.exit_code = Some(v);
        }
        if let Some(v) = self.stdout {
            execution.stdout = v;
        }
        if let Some(v) = self.stderr {
            execution.stderr = v;
        }
        if let Some(v) = self.error {
            execution.error = Some(v);
        }
    }
}

/// Job mutation run inside the store's write lock (read-modify-write under
/// optimistic concurrency).
pub type JobMutator = Box<dyn FnOnce(&mut Job) -> Result<(), StoreError> + Send>;

/// The system of record for tasks, jobs, and executions.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Get or create the task, bumping `last_modified_at_ms` on reuse.
    async fn ensure_task(&self, task_id: &str, now_ms: u64) -> Result<Task, StoreError>;

    async fn get_task(&self, task_id: &str) -> Result<Task, StoreError>;

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Insert a new job document.
    async fn insert_job(&self, job: Job) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: &JobId) -> Result<Job, StoreError>;

    /// Jobs for a task, ordered by job id (submission order).
    async fn list_jobs(&self, task_id: &str) -> Result<Vec<Job>, StoreError>;

    /// Read-modify-write a job document; returns the updated job.
    async fn update_job(
        &self,
        job_id: &JobId,
        now_ms: u64,
        mutate: JobMutator,
    ) -> Result<Job, StoreError>;

    /// Atomically advance every due schedule trigger and return the affected
    /// jobs (post-advance). The advance is the commit point: overlapping
    /// sweeps cannot double-take a trigger.
    async fn take_due(&self, now_ms: u64) -> Result<Vec<Job>, StoreError>;

    /// Append a fresh execution to a job.
    ///
    /// Enforces the one-active-execution invariant and the attempt ceiling;
    /// older executions' logs are truncated to `log_tail` bytes.
    async fn append_execution(
        &self,
        job_id: &JobId,
        execution: Execution,
        log_tail: usize,
        now_ms: u64,
    ) -> Result<Job, StoreError>;

    /// Compare-and-set transition of one execution.
    ///
    /// Applies `update` only when the current status is in `expected` and the
    /// target is a legal forward transition; otherwise returns
    /// [`StoreError::Conflict`] with the observed status.
    async fn transition_execution(
        &self,
        job_id: &JobId,
        execution_id: &ExecutionId,
        expected: &[ExecutionStatus],
        update: ExecutionUpdate,
        now_ms: u64,
    ) -> Result<Execution, StoreError>;

    /// Executions currently `running` on the given host (dispatcher index).
    async fn count_running_on_host(&self, host: &str) -> Result<usize, StoreError>;

    /// Jobs with a non-terminal execution (healer sweep).
    async fn jobs_with_active_executions(&self) -> Result<Vec<Job>, StoreError>;
}
