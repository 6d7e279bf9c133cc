// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor: observe a running execution, apply its timeout, drive it to a
//! terminal state, and decide retry vs final.
//!
//! Duplicate monitor messages are harmless: every write goes through the
//! store's compare-and-set, and a message for a terminal execution exits
//! cleanly: the store wins over the queue.

use super::{Engine, EngineError};
use fl_adapters::{ContainerRuntime, ContainerStatus, Notifier, RuntimeError};
use fl_core::{Clock, Execution, ExecutionId, ExecutionStatus, Job, JobId, Message, Schedule};
use fl_storage::{ExecutionUpdate, Queue};
use std::time::Duration;

/// Container name prefix marking an execution the monitor has finished with;
/// the pruner removes containers carrying it.
pub(crate) const DEFUNCT_PREFIX: &str = "defunct-";

impl<R, N, C> Engine<R, N, C>
where
    R: ContainerRuntime,
    N: Notifier,
    C: Clock,
{
    /// `monitor` queue handler: one poll cycle for one execution.
    pub(crate) async fn handle_poll_execution(
        &self,
        job_id: &JobId,
        execution_id: &ExecutionId,
        poll_count: u32,
    ) -> Result<(), EngineError> {
        let Some(job) = self.load_job(job_id).await? else { return Ok(()) };
        let Some(execution) =
            job.executions.iter().find(|e| e.execution_id == *execution_id).cloned()
        else {
            tracing::warn!(%job_id, %execution_id, "monitor message for unknown execution");
            return Ok(());
        };

        if execution.status.is_terminal() {
            // Stale hint; the store already settled this attempt.
            return Ok(());
        }

        let Some(container_id) = execution.container_id.clone() else {
            // Crash before create: bounce back to the runner.
            self.queues
                .jobs
                .push(Message::RunJob { job_id: *job_id, requeues: 0 }, Duration::ZERO)
                .await?;
            return Ok(());
        };

        let host = execution.container_host.clone();
        let now_ms = self.clock.epoch_ms();

        // Cooperative stop: the flag was flipped by the stop operation; this
        // poll observes it, stops the container, and finalizes.
        if job.stop_requested {
            match self.runtime.stop(&host, &container_id).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    self.pool.record_failure(&host, now_ms);
                    return Err(e.into());
                }
                Err(RuntimeError::ContainerNotFound(_)) => {}
                // Permanent refusal: finalize anyway so the stop lands.
                Err(e) => {
                    tracing::warn!(%job_id, %execution_id, error = %e, "runtime stop failed")
                }
            }
            self.finalize_execution(&job, &execution, ExecutionStatus::Stopped, None, None).await?;
            return Ok(());
        }

        let state = match self.runtime.inspect(&host, &container_id).await {
            Ok(state) => state,
            Err(e) if e.is_transient() => {
                self.pool.record_failure(&host, now_ms);
                return Err(e.into());
            }
            Err(RuntimeError::ContainerNotFound(_)) => {
                // The container is gone without a terminal observation.
                self.finalize_execution(
                    &job,
                    &execution,
                    ExecutionStatus::Failed,
                    None,
                    Some("container disappeared from host".to_string()),
                )
                .await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.pool.record_success(&host);

        match state.status {
            ContainerStatus::Created => {
                // Crash between create and start: the witness container
                // exists, so start it and fall back into the poll loop.
                if let Err(e) = self.runtime.start(&host, &container_id).await {
                    if e.is_transient() {
                        self.pool.record_failure(&host, now_ms);
                        return Err(e.into());
                    }
                    self.finalize_execution(
                        &job,
                        &execution,
                        ExecutionStatus::Failed,
                        None,
                        Some(e.to_string()),
                    )
                    .await?;
                    return Ok(());
                }
                if execution.status == ExecutionStatus::Created {
                    self.cas(
                        job_id,
                        &execution,
                        &[ExecutionStatus::Created],
                        ExecutionUpdate::to(ExecutionStatus::Running).started_at_ms(now_ms),
                    )
                    .await?;
                }
                self.requeue_poll(job_id, execution_id, poll_count).await
            }
            ContainerStatus::Exited | ContainerStatus::Dead => {
                let (stdout, stderr) = match self
                    .runtime
                    .logs(&host, &container_id, self.config.log_tail_bytes)
                    .await
                {
                    Ok(logs) => logs,
                    Err(e) if e.is_transient() => {
                        self.pool.record_failure(&host, now_ms);
                        return Err(e.into());
                    }
                    Err(_) => (String::new(), String::new()),
                };

                let exit_code = state.exit_code.unwrap_or(-1);
                let status = if state.status == ContainerStatus::Exited && exit_code == 0 {
                    ExecutionStatus::Done
                } else {
                    ExecutionStatus::Failed
                };
                let error = if status == ExecutionStatus::Done {
                    None
                } else {
                    Execution::combined_error(state.error.as_deref(), &stderr)
                };

                self.finalize_execution(
                    &job,
                    &execution,
                    status,
                    Some((exit_code, stdout, stderr)),
                    error,
                )
                .await?;
                Ok(())
            }
            // Running (or some in-between daemon state): enforce the
            // timeout, otherwise come back with exponential back-off.
            _ => {
                let timed_out = job
                    .spec
                    .timeout_ms
                    .zip(execution.elapsed_ms(now_ms))
                    .is_some_and(|(limit, elapsed)| elapsed >= limit);
                if timed_out {
                    match self.runtime.stop(&host, &container_id).await {
                        Ok(()) => {}
                        Err(e) if e.is_transient() => {
                            self.pool.record_failure(&host, now_ms);
                            return Err(e.into());
                        }
                        Err(RuntimeError::ContainerNotFound(_)) => {}
                        Err(e) => {
                            tracing::warn!(%job_id, %execution_id, error = %e, "runtime stop failed")
                        }
                    }
                    tracing::info!(
                        %job_id,
                        %execution_id,
                        elapsed_ms = execution.elapsed_ms(now_ms).unwrap_or(0),
                        "execution timed out"
                    );
                    self.finalize_execution(
                        &job,
                        &execution,
                        ExecutionStatus::Timedout,
                        None,
                        Some("execution exceeded its timeout".to_string()),
                    )
                    .await?;
                    return Ok(());
                }
                self.requeue_poll(job_id, execution_id, poll_count).await
            }
        }
    }

    async fn requeue_poll(
        &self,
        job_id: &JobId,
        execution_id: &ExecutionId,
        poll_count: u32,
    ) -> Result<(), EngineError> {
        let delay = self.config.monitor_backoff.delay(poll_count);
        self.queues
            .monitor
            .push(
                Message::PollExecution {
                    job_id: *job_id,
                    execution_id: *execution_id,
                    poll_count: poll_count + 1,
                },
                delay,
            )
            .await?;
        Ok(())
    }

    /// Drive an execution to a terminal status: capture what we have, stamp
    /// `finished_at`, rename the container for the pruner, settle the job.
    async fn finalize_execution(
        &self,
        job: &Job,
        execution: &Execution,
        status: ExecutionStatus,
        exit: Option<(i64, String, String)>,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let mut update = ExecutionUpdate::to(status).finished_at_ms(now_ms);
        if let Some((exit_code, stdout, stderr)) = exit {
            update = update.exit_code(exit_code).stdout(stdout).stderr(stderr);
        } else if let Some(container_id) = &execution.container_id {
            // Stopped/timed-out containers still have useful output.
            if let Ok((stdout, stderr)) = self
                .runtime
                .logs(&execution.container_host, container_id, self.config.log_tail_bytes)
                .await
            {
                update = update.stdout(stdout).stderr(stderr);
            }
        }
        if let Some(error) = error {
            update = update.error(error);
        }

        let expected =
            [ExecutionStatus::Pulling, ExecutionStatus::Created, ExecutionStatus::Running];
        let Some(updated) = self.cas(&job.job_id, execution, &expected, update).await? else {
            // Another worker settled this attempt first.
            return Ok(());
        };

        tracing::info!(
            job_id = %job.job_id,
            execution_id = %execution.execution_id,
            status = %updated.status,
            exit_code = ?updated.exit_code,
            "execution finished"
        );

        // Rename as a pruner hint; purely advisory.
        if let Some(container_id) = &execution.container_id {
            let name = format!("{}{}", DEFUNCT_PREFIX, execution.container_name());
            if let Err(e) =
                self.runtime.rename(&execution.container_host, container_id, &name).await
            {
                tracing::warn!(
                    container_id,
                    error = %e,
                    "container rename failed; pruner will miss it"
                );
            }
        }

        self.settle(&job.job_id).await
    }

    /// Retry-vs-final decision for a job whose latest attempt just settled.
    pub(crate) async fn settle(&self, job_id: &JobId) -> Result<(), EngineError> {
        let Some(job) = self.load_job(job_id).await? else { return Ok(()) };
        let Some(execution) = job.latest_execution() else { return Ok(()) };
        if !execution.status.is_terminal() {
            return Ok(());
        }
        let now_ms = self.clock.epoch_ms();

        // Retry decision first; only a job with no attempt left is final.
        let failed = matches!(
            execution.status,
            ExecutionStatus::Failed | ExecutionStatus::Timedout
        );
        if failed && !job.stop_requested {
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
            if job.attempts_remaining() {
                let attempt = execution.attempt;
                let delay = self.config.retry_backoff.delay(attempt);
                tracing::info!(
                    %job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying failed execution"
                );
                self.queues
                    .jobs
                    .push(Message::RunJob { job_id: *job_id, requeues: 0 }, delay)
                    .await?;
                return Ok(());
            }
        }

        if !job.stop_requested
            && (failed || execution.status == ExecutionStatus::Done)
        {
            self.rearm_cron(&job, now_ms).await?;
        }

        let Some(kind) = job.notice_kind() else { return Ok(()) };
        self.push_notices(&job, kind).await
    }

    /// Keep a cron job armed after a terminal attempt.
    ///
    /// The sweep's `take_due` normally keeps `next_ms` set; this covers a
    /// schedule that was disarmed in between (e.g. a retried stop).
    async fn rearm_cron(&self, job: &Job, now_ms: u64) -> Result<(), EngineError> {
        if !matches!(&job.schedule, Schedule::Cron { next_ms: None, .. }) {
            return Ok(());
        }
        self.store
            .update_job(
                &job.job_id,
                now_ms,
                Box::new(move |j| {
                    j.schedule
                        .arm(now_ms)
                        .map_err(|e| fl_storage::StoreError::Invalid(e.to_string()))
                }),
            )
            .await?;
        Ok(())
    }
}
