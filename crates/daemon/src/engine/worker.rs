// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker loops: pop, route, ack or release.
//!
//! Workers hold no locks and share nothing but the engine context;
//! concurrency is safe because every handler is idempotent and the store
//! serializes execution writes. On shutdown the loops stop popping, finish
//! their in-flight message, and exit.

use super::{Engine, EngineError};
use fl_adapters::{ContainerRuntime, Notifier};
use fl_core::{Clock, QueueName};
use fl_storage::Queue;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How long an idle worker waits before polling its queue again.
const IDLE_POLL: Duration = Duration::from_millis(200);

/// Per-queue counters, shared across workers.
#[derive(Default)]
pub struct QueueMetrics {
    pub in_flight: AtomicI64,
    pub handled: AtomicU64,
    pub failed: AtomicU64,
    pub released: AtomicU64,
    pub dropped: AtomicU64,
}

/// Worker metrics, one row per queue.
#[derive(Default)]
pub struct WorkerMetrics {
    pub jobs: QueueMetrics,
    pub monitor: QueueMetrics,
    pub webhooks: QueueMetrics,
    pub notify: QueueMetrics,
}

impl WorkerMetrics {
    pub fn for_queue(&self, name: QueueName) -> &QueueMetrics {
        match name {
            QueueName::Jobs => &self.jobs,
            QueueName::Monitor => &self.monitor,
            QueueName::Webhooks => &self.webhooks,
            QueueName::Notify => &self.notify,
        }
    }
}

impl<R, N, C> Engine<R, N, C>
where
    R: ContainerRuntime,
    N: Notifier,
    C: Clock,
{
    /// Process at most one message from the named queue.
    ///
    /// Returns whether a message was processed. This is the unit the worker
    /// loops (and deterministic tests) are built from.
    pub async fn step(
        &self,
        name: QueueName,
        metrics: &WorkerMetrics,
    ) -> Result<bool, EngineError> {
        let queue = self.queues.get(name);
        let Some(delivery) = queue.pop(self.config.visibility_timeout).await? else {
            return Ok(false);
        };
        let counters = metrics.for_queue(name);
        counters.in_flight.fetch_add(1, Ordering::Relaxed);

        let handled =
            tokio::time::timeout(self.config.handler_timeout, self.handle(delivery.message.clone()))
                .await;
        counters.in_flight.fetch_sub(1, Ordering::Relaxed);

        match handled {
            Ok(Ok(())) => {
                queue.ack(delivery.receipt).await?;
                counters.handled.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) if e.is_transient() => {
                if delivery.delivery_count >= self.config.max_deliveries {
                    // Poison message: report and drop rather than spin.
                    self.notifier
                        .error(
                            "worker",
                            &format!(
                                "dropping {} message for {} after {} deliveries: {}",
                                name,
                                delivery.message.job_id(),
                                delivery.delivery_count,
                                e
                            ),
                        )
                        .await;
                    queue.ack(delivery.receipt).await?;
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                } else {
                    // Released: left unacked, so it reappears once the
                    // visibility timeout lapses.
                    tracing::warn!(
                        queue = %name,
                        job_id = %delivery.message.job_id(),
                        error = %e,
                        delivery_count = delivery.delivery_count,
                        "transient handler failure, releasing for redelivery"
                    );
                    counters.released.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(Err(e)) => {
                // Permanent handler failure: the handler already mutated
                // whatever state it could; report and drop the message.
                self.notifier
                    .error(
                        "worker",
                        &format!(
                            "{} handler failed for {}: {}",
                            name,
                            delivery.message.job_id(),
                            e
                        ),
                    )
                    .await;
                queue.ack(delivery.receipt).await?;
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                // Handler timeout counts as transient: leave the message
                // unacked and let the idempotent handler try again.
                tracing::warn!(
                    queue = %name,
                    job_id = %delivery.message.job_id(),
                    "handler timed out, releasing for redelivery"
                );
                counters.released.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(true)
    }
}

/// The daemon's long-running task set: queue workers, the scheduler sweep,
/// and the pruner.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    pub metrics: Arc<WorkerMetrics>,
}

impl WorkerPool {
    /// Spawn all loops. The engine is shared; the returned pool owns the
    /// shutdown signal.
    pub fn spawn<R, N, C>(engine: Arc<Engine<R, N, C>>) -> Self
    where
        R: ContainerRuntime,
        N: Notifier,
        C: Clock,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(WorkerMetrics::default());
        let mut handles = Vec::new();

        for name in QueueName::ALL {
            for worker in 0..engine.config.workers_per_queue {
                let engine = Arc::clone(&engine);
                let metrics = Arc::clone(&metrics);
                let mut shutdown = shutdown_rx.clone();
                handles.push(tokio::spawn(async move {
                    tracing::debug!(queue = %name, worker, "worker started");
                    loop {
                        if *shutdown.borrow() {
                            break;
                        }
                        match engine.step(name, &metrics).await {
                            Ok(true) => {}
                            Ok(false) => {
                                // Idle: wait for work or shutdown.
                                tokio::select! {
                                    _ = tokio::time::sleep(IDLE_POLL) => {}
                                    _ = shutdown.changed() => {}
                                }
                            }
                            Err(e) => {
                                tracing::error!(queue = %name, error = %e, "worker step failed");
                                tokio::time::sleep(IDLE_POLL).await;
                            }
                        }
                    }
                    tracing::debug!(queue = %name, worker, "worker drained");
                }));
            }
        }

        // Scheduler sweep.
        {
            let engine = Arc::clone(&engine);
            let mut shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    if let Err(e) = engine.scheduler_tick().await {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(engine.config.tick) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }));
        }

        // Pruner.
        {
            let engine = Arc::clone(&engine);
            let mut shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(engine.config.pruner_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                    if let Err(e) = engine.prune().await {
                        tracing::error!(error = %e, "pruner sweep failed");
                    }
                }
            }));
        }

        Self { shutdown_tx, handles, metrics }
    }

    /// Graceful drain: stop pulling, finish in-flight messages, join.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "worker task join failed");
            }
        }
        tracing::info!("worker pool drained");
    }
}
