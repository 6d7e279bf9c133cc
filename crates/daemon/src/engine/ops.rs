// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core operations consumed by the API layer.
//!
//! Error mapping for the HTTP collaborator: [`EngineError::Validation`] →
//! 400, [`EngineError::NotFound`] → 404, [`EngineError::InvalidState`] →
//! 409.

use super::{Engine, EngineError};
use fl_adapters::{ContainerRuntime, Notifier};
use fl_core::{validate_task_id, Clock, Job, JobId, JobSpec, Message, NoticeKind, Schedule};
use fl_storage::{Queue, StoreError};
use std::time::Duration;

impl<R, N, C> Engine<R, N, C>
where
    R: ContainerRuntime,
    N: Notifier,
    C: Clock,
{
    /// Create a job under a task (the task is created on first use).
    ///
    /// Immediate jobs go straight onto the jobs queue; scheduled jobs wait
    /// for the sweep. Bad specs and bad cron expressions are rejected here
    /// and never stored.
    pub async fn create_job(
        &self,
        task_id: &str,
        spec: JobSpec,
        mut schedule: Schedule,
    ) -> Result<Job, EngineError> {
        validate_task_id(task_id).map_err(|e| EngineError::Validation(e.to_string()))?;
        if spec.image.is_empty() {
            return Err(EngineError::Validation("image may not be empty".to_string()));
        }
        if spec.command.is_empty() {
            return Err(EngineError::Validation("command may not be empty".to_string()));
        }

        let now_ms = self.clock.epoch_ms();
        schedule.arm(now_ms).map_err(|e| EngineError::Validation(e.to_string()))?;
        if let Schedule::Cron { next_ms: None, expr } = &schedule {
            return Err(EngineError::Validation(format!(
                "cron expression {:?} never fires",
                expr
            )));
        }

        self.store.ensure_task(task_id, now_ms).await.map_err(|e| match e {
            StoreError::Invalid(msg) => EngineError::Validation(msg),
            other => other.into(),
        })?;

        let job = Job::new(task_id, spec, schedule, now_ms);
        self.store.insert_job(job.clone()).await?;

        if matches!(job.schedule, Schedule::Immediate) {
            self.queues
                .jobs
                .push(Message::RunJob { job_id: job.job_id, requeues: 0 }, Duration::ZERO)
                .await?;
        }
        tracing::info!(job_id = %job.job_id, task_id, schedule = %job.schedule, "job created");
        Ok(job)
    }

    /// Replace the spec of a job that is not currently executing.
    pub async fn update_job(&self, job_id: &JobId, spec: JobSpec) -> Result<Job, EngineError> {
        if spec.image.is_empty() || spec.command.is_empty() {
            return Err(EngineError::Validation("image and command are required".to_string()));
        }
        let now_ms = self.clock.epoch_ms();
        let job = self.require_job(job_id).await?;
        if job.active_execution().is_some() {
            return Err(EngineError::InvalidState(format!(
                "job {} has an execution in flight",
                job_id
            )));
        }

        let updated = self
            .store
            .update_job(
                job_id,
                now_ms,
                Box::new(move |j| {
                    j.spec = spec;
                    // Future attempts run under the new retry budget.
                    j.max_attempts =
                        (j.executions.len() as u32 + j.spec.retries + 1).max(j.max_attempts);
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(%job_id, "job spec updated");
        Ok(updated)
    }

    /// Request a stop. Cooperative: flips the flag, disarms any cron
    /// trigger, and nudges the monitor so the container is stopped on the
    /// next observation.
    pub async fn stop_job(&self, job_id: &JobId) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let job = self.require_job(job_id).await?;
        if job.status().is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "job {} is already {}",
                job_id,
                job.status()
            )));
        }

        let updated = self
            .store
            .update_job(
                job_id,
                now_ms,
                Box::new(|j| {
                    j.stop_requested = true;
                    if let Schedule::Cron { next_ms, .. } = &mut j.schedule {
                        *next_ms = None;
                    }
                    if let Schedule::At { fired, .. } = &mut j.schedule {
                        *fired = true;
                    }
                    Ok(())
                }),
            )
            .await?;

        match updated.active_execution() {
            Some(execution) if execution.container_id.is_some() => {
                self.queues
                    .monitor
                    .push(
                        Message::PollExecution {
                            job_id: *job_id,
                            execution_id: execution.execution_id,
                            poll_count: 0,
                        },
                        Duration::ZERO,
                    )
                    .await?;
            }
            Some(execution) => {
                // No container yet: settle the attempt directly. If the
                // runner creates one concurrently, the CAS loses and the
                // monitor path finishes the stop.
                use fl_core::ExecutionStatus;
                self.cas(
                    job_id,
                    execution,
                    &[ExecutionStatus::Pulling, ExecutionStatus::Created],
                    fl_storage::ExecutionUpdate::to(ExecutionStatus::Stopped)
                        .finished_at_ms(now_ms),
                )
                .await?;
                self.settle(job_id).await?;
            }
            None => {
                // Nothing ever ran, so there is no execution to settle;
                // synthesize the stop notice directly.
                self.push_notices(&updated, NoticeKind::Stopped).await?;
            }
        }
        tracing::info!(%job_id, "stop requested");
        Ok(updated)
    }

    /// Force a fresh attempt, extending the budget by one. Allowed on
    /// settled jobs (including done); rejected while an execution is in
    /// flight.
    pub async fn retry_job(&self, job_id: &JobId) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let job = self.require_job(job_id).await?;
        if job.active_execution().is_some() {
            return Err(EngineError::InvalidState(format!(
                "job {} has an execution in flight",
                job_id
            )));
        }

        let updated = self
            .store
            .update_job(
                job_id,
                now_ms,
                Box::new(|j| {
                    j.extend_attempts_for_manual_retry();
                    j.stop_requested = false;
                    j.expired = false;
                    Ok(())
                }),
            )
            .await?;
        self.queues
            .jobs
            .push(Message::RunJob { job_id: *job_id, requeues: 0 }, Duration::ZERO)
            .await?;
        tracing::info!(%job_id, max_attempts = updated.max_attempts, "manual retry enqueued");
        Ok(updated)
    }

    /// Canonical logs for a job: the latest execution's stdout and stderr.
    pub async fn job_logs(&self, job_id: &JobId) -> Result<(String, String), EngineError> {
        let job = self.require_job(job_id).await?;
        Ok(job
            .latest_execution()
            .map(|e| (e.stdout.clone(), e.stderr.clone()))
            .unwrap_or_default())
    }

    async fn require_job(&self, job_id: &JobId) -> Result<Job, EngineError> {
        match self.store.get_job(job_id).await {
            Ok(job) => Ok(job),
            Err(StoreError::NotFound(msg)) => Err(EngineError::NotFound(msg)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
