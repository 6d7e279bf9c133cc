// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for visibility timeouts, redelivery, and ordering.

use crate::queue::{MemoryQueue, Queue, QueueSet};
use fl_core::{FakeClock, JobId, Message, QueueName};
use std::time::Duration;

fn msg(n: u32) -> Message {
    Message::RunJob { job_id: JobId::from_string(format!("job-{}", n)), requeues: 0 }
}

fn queue() -> (MemoryQueue<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (MemoryQueue::new(QueueName::Jobs, clock.clone()), clock)
}

const VT: Duration = Duration::from_secs(30);

#[tokio::test]
async fn push_pop_ack() {
    let (q, _clock) = queue();
    q.push(msg(1), Duration::ZERO).await.unwrap();
    assert_eq!(q.depth().await.unwrap(), 1);

    let delivery = q.pop(VT).await.unwrap().unwrap();
    assert_eq!(delivery.message, msg(1));
    assert_eq!(delivery.delivery_count, 1);
    assert_eq!(q.in_flight().await.unwrap(), 1);

    assert!(q.ack(delivery.receipt).await.unwrap());
    assert_eq!(q.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn delayed_message_is_invisible_until_due() {
    let (q, clock) = queue();
    q.push(msg(1), Duration::from_secs(5)).await.unwrap();

    assert!(q.pop(VT).await.unwrap().is_none());

    clock.advance(Duration::from_secs(5));
    assert!(q.pop(VT).await.unwrap().is_some());
}

#[tokio::test]
async fn unacked_message_reappears_after_visibility_timeout() {
    let (q, clock) = queue();
    q.push(msg(1), Duration::ZERO).await.unwrap();

    let first = q.pop(VT).await.unwrap().unwrap();
    assert!(q.pop(VT).await.unwrap().is_none(), "invisible while in flight");

    clock.advance(VT);
    let second = q.pop(VT).await.unwrap().unwrap();
    assert_eq!(second.message, first.message);
    assert_eq!(second.delivery_count, 2, "redelivery bumps the count");
}

#[tokio::test]
async fn ack_after_timeout_does_not_resurrect() {
    let (q, clock) = queue();
    q.push(msg(1), Duration::ZERO).await.unwrap();

    let first = q.pop(VT).await.unwrap().unwrap();
    clock.advance(VT);
    let second = q.pop(VT).await.unwrap().unwrap();

    // The slow worker's ack still deletes the message; the fast worker's
    // ack then finds nothing. Handlers are idempotent so either order is fine.
    assert!(q.ack(first.receipt).await.unwrap());
    assert!(!q.ack(second.receipt).await.unwrap());
    assert_eq!(q.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn pop_orders_by_visibility_time() {
    let (q, clock) = queue();
    q.push(msg(2), Duration::from_secs(2)).await.unwrap();
    q.push(msg(1), Duration::from_secs(1)).await.unwrap();
    clock.advance(Duration::from_secs(3));

    let first = q.pop(VT).await.unwrap().unwrap();
    let second = q.pop(VT).await.unwrap().unwrap();
    assert_eq!(first.message, msg(1));
    assert_eq!(second.message, msg(2));
}

#[tokio::test]
async fn queue_set_routes_by_name() {
    let clock = FakeClock::new();
    let queues = QueueSet::in_memory(clock);
    queues.get(QueueName::Monitor).push(msg(1), Duration::ZERO).await.unwrap();

    assert_eq!(queues.monitor.depth().await.unwrap(), 1);
    assert_eq!(queues.jobs.depth().await.unwrap(), 0);
}
