// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job lifecycle engine.
//!
//! One [`Engine`] value is the explicit context threaded through every
//! worker: store, queues, container runtime, notifier, host pool, clock,
//! and config. It is created at process start and shared via `Arc`.

mod error;
mod healer;
mod monitor;
pub mod ops;
mod pool;
mod runner;
mod scheduler;
#[cfg(test)]
pub(crate) mod test_helpers;
mod worker;

pub use error::EngineError;
pub use pool::{HostPool, PoolError};
pub use worker::{QueueMetrics, WorkerMetrics, WorkerPool};

use crate::config::Config;
use fl_adapters::{ContainerRuntime, JobNotice, Notifier};
use fl_core::{Clock, Job, JobId, Message, NoticeKind};
use fl_storage::{Queue, QueueSet, Store, StoreError};
use std::sync::Arc;
use std::time::Duration;

/// Adapter and backend dependencies for the engine.
pub struct EngineDeps<R, N> {
    pub runtime: R,
    pub notifier: N,
    pub store: Arc<dyn Store>,
    pub queues: QueueSet,
}

/// The engine: scheduler, dispatcher, runner, monitor, healer, and the
/// operations the API layer calls.
pub struct Engine<R, N, C: Clock> {
    pub(crate) runtime: R,
    pub(crate) notifier: N,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) queues: QueueSet,
    pub(crate) pool: HostPool,
    pub(crate) clock: C,
    pub(crate) config: Config,
}

impl<R, N, C> Engine<R, N, C>
where
    R: ContainerRuntime,
    N: Notifier,
    C: Clock,
{
    pub fn new(deps: EngineDeps<R, N>, clock: C, config: Config) -> Result<Self, EngineError> {
        let pool = HostPool::new(
            &config.pools,
            &config.blacklisted_hosts,
            config.circuit_threshold,
            config.circuit_cooldown,
        )
        .map_err(|e| EngineError::Validation(e.to_string()))?;
        Ok(Self {
            runtime: deps.runtime,
            notifier: deps.notifier,
            store: deps.store,
            queues: deps.queues,
            pool,
            clock,
            config,
        })
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn host_pool(&self) -> &HostPool {
        &self.pool
    }

    /// Route a queue message to its handler.
    pub async fn handle(&self, message: Message) -> Result<(), EngineError> {
        let name = message.name();
        let job_id = *message.job_id();
        tracing::debug!(handler = name, %job_id, "handling message");
        match message {
            Message::RunJob { job_id, requeues } => self.handle_run_job(&job_id, requeues).await,
            Message::PollExecution { job_id, execution_id, poll_count } => {
                self.handle_poll_execution(&job_id, &execution_id, poll_count).await
            }
            Message::DeliverWebhooks { job_id, event } => {
                self.handle_deliver_webhooks(&job_id, event).await
            }
            Message::NotifyTerminal { job_id, event } => {
                self.handle_notify_terminal(&job_id, event).await
            }
        }
    }

    /// Load a job, treating a missing document as "queue hint was stale".
    pub(crate) async fn load_job(&self, job_id: &JobId) -> Result<Option<Job>, EngineError> {
        match self.store.get_job(job_id).await {
            Ok(job) => Ok(Some(job)),
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(%job_id, "message for unknown job, dropping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Push the terminal-state side effects for a settled job.
    pub(crate) async fn push_notices(
        &self,
        job: &Job,
        kind: NoticeKind,
    ) -> Result<(), EngineError> {
        self.queues
            .notify
            .push(Message::NotifyTerminal { job_id: job.job_id, event: kind }, Duration::ZERO)
            .await?;
        if !job.spec.notify.webhooks.is_empty() {
            self.queues
                .webhooks
                .push(Message::DeliverWebhooks { job_id: job.job_id, event: kind }, Duration::ZERO)
                .await?;
        }
        tracing::info!(job_id = %job.job_id, %kind, "job settled");
        Ok(())
    }

    /// Deliver a terminal-state notice (`notify` queue handler).
    pub(crate) async fn handle_notify_terminal(
        &self,
        job_id: &JobId,
        kind: NoticeKind,
    ) -> Result<(), EngineError> {
        let Some(job) = self.load_job(job_id).await? else { return Ok(()) };
        let notice = JobNotice {
            kind,
            task_id: job.task_id.clone(),
            job_id: job.job_id,
            emails: job.spec.notify.emails.clone(),
            payload: job.render(&self.config.env_blacklist),
        };
        self.notifier.notify(&notice).await?;
        Ok(())
    }

    /// Deliver webhook callbacks (`webhooks` queue handler).
    ///
    /// Transient delivery failures release the whole message; endpoints that
    /// reject permanently are reported and skipped.
    pub(crate) async fn handle_deliver_webhooks(
        &self,
        job_id: &JobId,
        kind: NoticeKind,
    ) -> Result<(), EngineError> {
        let Some(job) = self.load_job(job_id).await? else { return Ok(()) };
        let mut payload = job.render(&self.config.env_blacklist);
        payload["event"] = serde_json::Value::String(kind.to_string());

        for url in &job.spec.notify.webhooks {
            match self.notifier.webhook(url, &payload).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => return Err(e.into()),
                Err(e) => {
                    self.notifier
                        .error("webhook", &format!("{} for job {}: {}", url, job_id, e))
                        .await;
                }
            }
        }
        Ok(())
    }
}
