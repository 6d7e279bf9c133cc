// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner: materialize an execution on a host.
//!
//! Each step is a store transition point (pulling → created → running), so a
//! crash between any two steps leaves a state the healer can resume from:
//! `container_id` is the witness that create succeeded.

use super::{Engine, EngineError};
use fl_adapters::{ContainerRuntime, Notifier, RuntimeError};
use fl_core::{Clock, Execution, ExecutionStatus, Job, JobId, Message};
use fl_storage::{ExecutionUpdate, Queue, StoreError};
use std::time::Duration;

use super::pool::PoolError;

impl<R, N, C> Engine<R, N, C>
where
    R: ContainerRuntime,
    N: Notifier,
    C: Clock,
{
    /// `jobs` queue handler: dispatch a job and drive its next attempt.
    pub(crate) async fn handle_run_job(
        &self,
        job_id: &JobId,
        requeues: u32,
    ) -> Result<(), EngineError> {
        let Some(job) = self.load_job(job_id).await? else { return Ok(()) };
        let now_ms = self.clock.epoch_ms();

        if job.stop_requested || job.expired {
            tracing::debug!(%job_id, "dispatch for halted job ignored");
            return Ok(());
        }

        // A live attempt already exists (crash recovery or duplicate
        // delivery): resume it instead of appending a new one.
        if let Some(execution) = job.active_execution() {
            let execution = execution.clone();
            return self.resume_execution(&job, execution).await;
        }

        if !job.attempts_remaining() {
            tracing::debug!(%job_id, "dispatch after attempt budget exhausted ignored");
            return Ok(());
        }

        if job.is_past_expiration(now_ms) {
            let expired = self
                .store
                .update_job(
                    job_id,
                    now_ms,
                    Box::new(|j| {
                        j.expired = true;
                        Ok(())
                    }),
                )
                .await?;
            if let Some(kind) = expired.notice_kind() {
                self.push_notices(&expired, kind).await?;
            }
            return Ok(());
        }

        // Pick a host under pool rules; a saturated pool bounces the job
        // back with back-off so queue depth reflects real contention.
        let host = match self.pool.select(&job.task_id, &self.store, now_ms).await {
            Ok(host) => host,
            Err(PoolError::Saturated { running, max_running, .. }) => {
                let delay = self.config.saturation_backoff.delay(requeues);
                tracing::info!(
                    %job_id,
                    running,
                    max_running,
                    delay_ms = delay.as_millis() as u64,
                    "pool saturated, requeueing"
                );
                self.queues
                    .jobs
                    .push(Message::RunJob { job_id: *job_id, requeues: requeues + 1 }, delay)
                    .await?;
                return Ok(());
            }
            Err(PoolError::NoHosts(task_id)) => {
                // Hosts exist but none is usable right now (disabled or
                // circuit-open). Treated like saturation, loudly.
                self.notifier
                    .error("dispatch", &format!("no available host for task {}", task_id))
                    .await;
                let delay = self.config.saturation_backoff.delay(requeues);
                self.queues
                    .jobs
                    .push(Message::RunJob { job_id: *job_id, requeues: requeues + 1 }, delay)
                    .await?;
                return Ok(());
            }
            Err(PoolError::Store(e)) => return Err(e.into()),
        };

        let attempt = job.executions.len() as u32;
        let execution = Execution::new(
            attempt,
            host,
            job.spec.image.clone(),
            job.spec.command.clone(),
            job.spec.envs.clone(),
        );

        // The host decision is recorded atomically with the execution record;
        // a racing worker loses here and becomes a no-op.
        let job = match self
            .store
            .append_execution(job_id, execution.clone(), self.config.log_tail_bytes, now_ms)
            .await
        {
            Ok(job) => job,
            Err(StoreError::ActiveExecution(_)) | Err(StoreError::AttemptsExhausted(_)) => {
                tracing::debug!(%job_id, "lost dispatch race, dropping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            %job_id,
            execution_id = %execution.execution_id,
            attempt,
            host = %execution.container_host,
            "execution dispatched"
        );
        self.advance_execution(&job, execution).await
    }

    /// Resume an attempt found in a non-terminal state.
    async fn resume_execution(&self, job: &Job, execution: Execution) -> Result<(), EngineError> {
        if execution.container_id.is_some() {
            // Create already happened; the monitor takes over from the
            // container's real state.
            self.queues
                .monitor
                .push(
                    Message::PollExecution {
                        job_id: job.job_id,
                        execution_id: execution.execution_id,
                        poll_count: 0,
                    },
                    Duration::ZERO,
                )
                .await?;
            return Ok(());
        }
        self.advance_execution(job, execution).await
    }

    /// Drive an execution through pull → create → start → monitored.
    ///
    /// Transient runtime failures bubble out so the worker releases the
    /// message; the next delivery resumes from the persisted step.
    async fn advance_execution(
        &self,
        job: &Job,
        mut execution: Execution,
    ) -> Result<(), EngineError> {
        let job_id = job.job_id;
        let host = execution.container_host.clone();

        if execution.status == ExecutionStatus::Pulling {
            if let Err(e) = self.runtime.pull(&host, &execution.image).await {
                return self.runner_failure(&job_id, &execution, e).await;
            }

            let container_id = match self
                .runtime
                .create(
                    &host,
                    &execution.container_name(),
                    &execution.image,
                    &execution.command,
                    &execution.envs,
                )
                .await
            {
                Ok(id) => id,
                Err(e) => return self.runner_failure(&job_id, &execution, e).await,
            };

            let Some(next) = self
                .cas(
                    &job_id,
                    &execution,
                    &[ExecutionStatus::Pulling],
                    ExecutionUpdate::to(ExecutionStatus::Created).container_id(container_id),
                )
                .await?
            else {
                return Ok(());
            };
            execution = next;
        }

        if execution.status == ExecutionStatus::Created {
            let container_id = execution.container_id.clone().unwrap_or_default();
            if let Err(e) = self.runtime.start(&host, &container_id).await {
                return self.runner_failure(&job_id, &execution, e).await;
            }
            let now_ms = self.clock.epoch_ms();
            let Some(next) = self
                .cas(
                    &job_id,
                    &execution,
                    &[ExecutionStatus::Created],
                    ExecutionUpdate::to(ExecutionStatus::Running).started_at_ms(now_ms),
                )
                .await?
            else {
                return Ok(());
            };
            execution = next;
            self.pool.record_success(&host);
            tracing::info!(%job_id, execution_id = %execution.execution_id, host = %host, "execution started");
        }

        if execution.status == ExecutionStatus::Running {
            self.queues
                .monitor
                .push(
                    Message::PollExecution {
                        job_id,
                        execution_id: execution.execution_id,
                        poll_count: 0,
                    },
                    self.config.initial_monitor_delay,
                )
                .await?;
        }
        Ok(())
    }

    /// Classify a runtime failure during a runner step.
    ///
    /// Transient → record against the host circuit and release the message.
    /// Permanent → fail the attempt and run the retry decision.
    async fn runner_failure(
        &self,
        job_id: &JobId,
        execution: &Execution,
        error: RuntimeError,
    ) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        if error.is_transient() {
            self.pool.record_failure(&execution.container_host, now_ms);
            tracing::warn!(
                %job_id,
                execution_id = %execution.execution_id,
                host = %execution.container_host,
                error = %error,
                "transient runner failure, releasing for redelivery"
            );
            return Err(error.into());
        }

        tracing::warn!(
            %job_id,
            execution_id = %execution.execution_id,
            error = %error,
            "execution failed before start"
        );
        let settled = self
            .cas(
                job_id,
                execution,
                &[ExecutionStatus::Pulling, ExecutionStatus::Created],
                ExecutionUpdate::to(ExecutionStatus::Failed)
                    .finished_at_ms(now_ms)
                    .error(error.to_string()),
            )
            .await?;
        if settled.is_some() {
            self.settle(job_id).await?;
        }
        Ok(())
    }

    /// Compare-and-set wrapper: a conflict means another writer won; observe
    /// and no-op.
    pub(crate) async fn cas(
        &self,
        job_id: &JobId,
        execution: &Execution,
        expected: &[ExecutionStatus],
        update: ExecutionUpdate,
    ) -> Result<Option<Execution>, EngineError> {
        let now_ms = self.clock.epoch_ms();
        match self
            .store
            .transition_execution(job_id, &execution.execution_id, expected, update, now_ms)
            .await
        {
            Ok(updated) => Ok(Some(updated)),
            Err(StoreError::Conflict { expected, actual }) => {
                tracing::debug!(
                    %job_id,
                    execution_id = %execution.execution_id,
                    expected,
                    %actual,
                    "lost status race, dropping write"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
