// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory reference implementation of the [`Store`] trait.
//!
//! Single `parking_lot::Mutex` over the document maps; every trait method is
//! one critical section, which gives the same atomicity the external
//! backends provide per document operation.

use crate::store::{ExecutionUpdate, JobMutator, Store, StoreError};
use async_trait::async_trait;
use fl_core::{Execution, ExecutionId, ExecutionStatus, Job, JobId, Task};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Documents {
    tasks: HashMap<String, Task>,
    jobs: HashMap<JobId, Job>,
}

/// In-memory store; clones share the same documents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Documents>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_task(&self, task_id: &str, now_ms: u64) -> Result<Task, StoreError> {
        let mut docs = self.inner.lock();
        if let Some(task) = docs.tasks.get_mut(task_id) {
            task.last_modified_at_ms = now_ms;
            return Ok(task.clone());
        }
        let task = Task::new(task_id, now_ms).map_err(|e| StoreError::Invalid(e.to_string()))?;
        docs.tasks.insert(task_id.to_string(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, StoreError> {
        self.inner
            .lock()
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("task {}", task_id)))
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self.inner.lock().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(tasks)
    }

    async fn insert_job(&self, job: Job) -> Result<(), StoreError> {
        let mut docs = self.inner.lock();
        if docs.jobs.contains_key(&job.job_id) {
            return Err(StoreError::AlreadyExists(format!("job {}", job.job_id)));
        }
        docs.jobs.insert(job.job_id, job);
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Job, StoreError> {
        self.inner
            .lock()
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))
    }

    async fn list_jobs(&self, task_id: &str) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.task_id == task_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.job_id);
        Ok(jobs)
    }

    async fn update_job(
        &self,
        job_id: &JobId,
        now_ms: u64,
        mutate: JobMutator,
    ) -> Result<Job, StoreError> {
        let mut docs = self.inner.lock();
        let job = docs
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        mutate(job)?;
        job.last_modified_at_ms = now_ms;
        Ok(job.clone())
    }

    async fn take_due(&self, now_ms: u64) -> Result<Vec<Job>, StoreError> {
        let mut docs = self.inner.lock();
        let mut due = Vec::new();
        for job in docs.jobs.values_mut() {
            match job.schedule.take_due(now_ms) {
                Ok(true) => {
                    job.last_modified_at_ms = now_ms;
                    due.push(job.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    // Validated at creation; a failure here means the stored
                    // expression was corrupted. Leave the job alone.
                    tracing::error!(job_id = %job.job_id, error = %e, "cron advance failed");
                }
            }
        }
        due.sort_by_key(|j| j.job_id);
        Ok(due)
    }

    async fn append_execution(
        &self,
        job_id: &JobId,
        execution: Execution,
        log_tail: usize,
        now_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut docs = self.inner.lock();
        let job = docs
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;

        if job.executions.iter().any(|e| !e.status.is_terminal()) {
            return Err(StoreError::ActiveExecution(*job_id));
        }
        if !job.attempts_remaining() {
            return Err(StoreError::AttemptsExhausted(*job_id));
        }

        // Older executions keep only a bounded tail; the new attempt's logs
        // are the job's canonical logs once captured.
        for old in job.executions.iter_mut() {
            old.truncate_logs(log_tail);
        }
        job.executions.push(execution);
        job.last_modified_at_ms = now_ms;
        Ok(job.clone())
    }

    async fn transition_execution(
        &self,
        job_id: &JobId,
        execution_id: &ExecutionId,
        expected: &[ExecutionStatus],
        update: ExecutionUpdate,
        now_ms: u64,
    ) -> Result<Execution, StoreError> {
        let mut docs = self.inner.lock();
        let job = docs
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        let execution = job
            .executions
            .iter_mut()
            .find(|e| e.execution_id == *execution_id)
            .ok_or_else(|| StoreError::NotFound(format!("execution {}", execution_id)))?;

        let conflict = |actual: ExecutionStatus| StoreError::Conflict {
            expected: expected.iter().map(|s| s.to_string()).collect::<Vec<_>>().join("|"),
            actual,
        };

        if !expected.contains(&execution.status) {
            return Err(conflict(execution.status));
        }
        if let Some(target) = update.status {
            if !execution.status.can_transition(target) {
                return Err(conflict(execution.status));
            }
        }

        update.apply(execution);
        let updated = execution.clone();
        job.last_modified_at_ms = now_ms;
        Ok(updated)
    }

    async fn count_running_on_host(&self, host: &str) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .flat_map(|j| j.executions.iter())
            .filter(|e| e.container_host == host && e.status == ExecutionStatus::Running)
            .count())
    }

    async fn jobs_with_active_executions(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.executions.iter().any(|e| !e.status.is_terminal()))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.job_id);
        Ok(jobs)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
