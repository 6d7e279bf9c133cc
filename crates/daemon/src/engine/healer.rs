// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Healer and pruner.
//!
//! The healer runs at startup: every execution orphaned in a non-terminal
//! state by a crash is re-observed (monitor) or re-driven (runner) within
//! one cycle. Overdue schedule triggers are caught by the first scheduler
//! sweep. The pruner periodically removes containers the monitor renamed
//! with the defunct prefix.

use super::monitor::DEFUNCT_PREFIX;
use super::{Engine, EngineError};
use fl_adapters::{ContainerRuntime, Notifier};
use fl_core::{Clock, Message};
use fl_storage::Queue;
use std::time::Duration;

impl<R, N, C> Engine<R, N, C>
where
    R: ContainerRuntime,
    N: Notifier,
    C: Clock,
{
    /// Re-enqueue every non-terminal execution. Idempotent: a duplicate
    /// monitor message merely re-observes state.
    pub async fn heal(&self) -> Result<usize, EngineError> {
        let jobs = self.store.jobs_with_active_executions().await?;
        let mut healed = 0;

        for job in jobs {
            let Some(execution) = job.active_execution() else { continue };
            let message = if execution.container_id.is_some() {
                Message::PollExecution {
                    job_id: job.job_id,
                    execution_id: execution.execution_id,
                    poll_count: 0,
                }
            } else {
                Message::RunJob { job_id: job.job_id, requeues: 0 }
            };
            tracing::info!(
                job_id = %job.job_id,
                execution_id = %execution.execution_id,
                status = %execution.status,
                has_container = execution.container_id.is_some(),
                "healing orphaned execution"
            );
            let queue = if execution.container_id.is_some() {
                &self.queues.monitor
            } else {
                &self.queues.jobs
            };
            queue.push(message, Duration::ZERO).await?;
            healed += 1;
        }

        if healed > 0 {
            tracing::info!(healed, "healer re-enqueued orphaned executions");
        }
        Ok(healed)
    }

    /// Remove processed containers from every configured host.
    pub async fn prune(&self) -> Result<usize, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let mut removed = 0;

        for host in self.pool.all_hosts() {
            let ids = match self.runtime.list(&host, DEFUNCT_PREFIX).await {
                Ok(ids) => ids,
                Err(e) if e.is_transient() => {
                    self.pool.record_failure(&host, now_ms);
                    tracing::warn!(host, error = %e, "pruner skipping unreachable host");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(host, error = %e, "pruner list failed");
                    continue;
                }
            };
            for container_id in ids {
                match self.runtime.remove(&host, &container_id).await {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(host, container_id, error = %e, "pruner remove failed")
                    }
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "pruned processed containers");
        }
        Ok(removed)
    }
}
