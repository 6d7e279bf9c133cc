// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler sweep: move due triggers onto the jobs queue, exactly once per
//! triggering.
//!
//! The store's `take_due` advances every due trigger atomically (cron →
//! next tick, at → fired) and hands back the affected jobs; that write is
//! the commit point, so overlapping sweeps or a crash between sweep and
//! enqueue cannot double-fire.

use super::{Engine, EngineError};
use fl_adapters::{ContainerRuntime, Notifier};
use fl_core::{Clock, Job, Message};
use fl_storage::Queue;
use std::time::Duration;

impl<R, N, C> Engine<R, N, C>
where
    R: ContainerRuntime,
    N: Notifier,
    C: Clock,
{
    /// One scheduler sweep. Returns the number of jobs enqueued.
    pub async fn scheduler_tick(&self) -> Result<usize, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let due = self.store.take_due(now_ms).await?;
        let mut enqueued = 0;

        for job in due {
            if self.fire_trigger(job, now_ms).await? {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    /// Route one consumed trigger: expire, skip on overlap, or enqueue.
    async fn fire_trigger(&self, job: Job, now_ms: u64) -> Result<bool, EngineError> {
        let job_id = job.job_id;

        if job.stop_requested {
            tracing::debug!(%job_id, "trigger for stopped job ignored");
            return Ok(false);
        }

        if job.is_past_expiration(now_ms) {
            let expired = self
                .store
                .update_job(
                    &job_id,
                    now_ms,
                    Box::new(|j| {
                        j.expired = true;
                        Ok(())
                    }),
                )
                .await?;
            tracing::info!(%job_id, "job expired before start");
            if let Some(kind) = expired.notice_kind() {
                self.push_notices(&expired, kind).await?;
            }
            return Ok(false);
        }

        // Overlap suppression: a cron trigger that fires while the previous
        // execution is still running is skipped, not queued.
        if job.schedule.is_cron() && job.active_execution().is_some() {
            self.store
                .update_job(
                    &job_id,
                    now_ms,
                    Box::new(|j| {
                        j.skipped_triggers += 1;
                        Ok(())
                    }),
                )
                .await?;
            tracing::info!(%job_id, "cron trigger skipped: previous execution still running");
            return Ok(false);
        }

        // Each cron firing gets its own retry budget on top of the attempts
        // already made.
        if job.schedule.is_cron() {
            self.store
                .update_job(
                    &job_id,
                    now_ms,
                    Box::new(|j| {
                        j.extend_attempts_for_trigger();
                        Ok(())
                    }),
                )
                .await?;
        }

        self.queues
            .jobs
            .push(Message::RunJob { job_id, requeues: 0 }, Duration::ZERO)
            .await?;
        tracing::debug!(%job_id, "trigger enqueued");
        Ok(true)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
