// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reliable queue interface: push-at-delay, visibility timeouts,
//! at-least-once delivery.
//!
//! A popped message becomes invisible for the visibility timeout and must be
//! acked, else it reappears. Ordering is best-effort by visibility
//! timestamp. The in-memory implementation mirrors the sorted-set layout an
//! external key-value backend would use (score = earliest-visible time).

use async_trait::async_trait;
use fl_core::{Clock, Message, QueueName};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backend is unreachable or timing out.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Unavailable(_))
    }
}

/// A popped message plus the receipt needed to ack it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: u64,
    pub message: Message,
    /// 1 on first delivery; grows on each redelivery.
    pub delivery_count: u32,
}

/// A reliable work stream.
#[async_trait]
pub trait Queue: Send + Sync + 'static {
    /// Push a message that becomes visible after `delay`.
    async fn push(&self, message: Message, delay: Duration) -> Result<(), QueueError>;

    /// Pop the earliest visible message, making it invisible for
    /// `visibility_timeout`. Non-blocking; `None` when nothing is visible.
    async fn pop(&self, visibility_timeout: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Delete an in-flight message. Returns false when the receipt is gone
    /// (already acked, or it timed out and was re-delivered).
    ///
    /// There is no explicit nack: a handler that fails simply does not ack,
    /// and the message reappears when its visibility timeout lapses.
    async fn ack(&self, receipt: u64) -> Result<bool, QueueError>;

    /// Total messages (visible + in-flight).
    async fn depth(&self) -> Result<usize, QueueError>;

    /// Messages currently invisible under a visibility timeout.
    async fn in_flight(&self) -> Result<usize, QueueError>;
}

struct Item {
    seq: u64,
    message: Message,
    visible_at_ms: u64,
    /// Invisible until this deadline while a worker holds the message.
    taken_until_ms: Option<u64>,
    delivery_count: u32,
}

#[derive(Default)]
struct QueueInner {
    items: Vec<Item>,
    next_seq: u64,
}

/// In-memory queue; clones share the same items.
#[derive(Clone)]
pub struct MemoryQueue<C: Clock> {
    name: QueueName,
    clock: C,
    inner: Arc<Mutex<QueueInner>>,
}

impl<C: Clock> MemoryQueue<C> {
    pub fn new(name: QueueName, clock: C) -> Self {
        Self { name, clock, inner: Arc::new(Mutex::new(QueueInner::default())) }
    }

    pub fn name(&self) -> QueueName {
        self.name
    }
}

#[async_trait]
impl<C: Clock> Queue for MemoryQueue<C> {
    async fn push(&self, message: Message, delay: Duration) -> Result<(), QueueError> {
        let visible_at_ms = self.clock.epoch_ms() + delay.as_millis() as u64;
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.items.push(Item {
            seq,
            message,
            visible_at_ms,
            taken_until_ms: None,
            delivery_count: 0,
        });
        tracing::debug!(queue = %self.name, seq, delay_ms = delay.as_millis() as u64, "pushed");
        Ok(())
    }

    async fn pop(&self, visibility_timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        let candidate = inner
            .items
            .iter_mut()
            .filter(|item| {
                item.visible_at_ms <= now_ms
                    && item.taken_until_ms.is_none_or(|deadline| deadline <= now_ms)
            })
            .min_by_key(|item| (item.visible_at_ms, item.seq));

        let Some(item) = candidate else { return Ok(None) };
        item.taken_until_ms = Some(now_ms + visibility_timeout.as_millis() as u64);
        item.delivery_count += 1;
        Ok(Some(Delivery {
            receipt: item.seq,
            message: item.message.clone(),
            delivery_count: item.delivery_count,
        }))
    }

    async fn ack(&self, receipt: u64) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock();
        let before = inner.items.len();
        inner.items.retain(|item| item.seq != receipt);
        Ok(inner.items.len() < before)
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().items.len())
    }

    async fn in_flight(&self) -> Result<usize, QueueError> {
        let now_ms = self.clock.epoch_ms();
        Ok(self
            .inner
            .lock()
            .items
            .iter()
            .filter(|item| item.taken_until_ms.is_some_and(|deadline| deadline > now_ms))
            .count())
    }
}

/// The four named work streams, bundled for the engine.
#[derive(Clone)]
pub struct QueueSet {
    pub jobs: Arc<dyn Queue>,
    pub monitor: Arc<dyn Queue>,
    pub webhooks: Arc<dyn Queue>,
    pub notify: Arc<dyn Queue>,
}

impl QueueSet {
    /// Build an in-memory queue set sharing one clock.
    pub fn in_memory<C: Clock>(clock: C) -> Self {
        Self {
            jobs: Arc::new(MemoryQueue::new(QueueName::Jobs, clock.clone())),
            monitor: Arc::new(MemoryQueue::new(QueueName::Monitor, clock.clone())),
            webhooks: Arc::new(MemoryQueue::new(QueueName::Webhooks, clock.clone())),
            notify: Arc::new(MemoryQueue::new(QueueName::Notify, clock)),
        }
    }

    pub fn get(&self, name: QueueName) -> &Arc<dyn Queue> {
        match name {
            QueueName::Jobs => &self.jobs,
            QueueName::Monitor => &self.monitor,
            QueueName::Webhooks => &self.webhooks,
            QueueName::Notify => &self.notify,
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
