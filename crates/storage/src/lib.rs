// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fl-storage: Store and Queue interfaces plus the in-memory reference
//! backend.
//!
//! The store is the system of record; the queues are ephemeral hints with
//! at-least-once delivery. External backends (document store, sorted-set
//! queue) implement the same traits behind the same semantics: optimistic
//! concurrency on execution status, atomic trigger advance, visibility
//! timeouts.

pub mod memory;
pub mod queue;
pub mod store;

pub use memory::MemoryStore;
pub use queue::{Delivery, MemoryQueue, Queue, QueueError, QueueSet};
pub use store::{ExecutionUpdate, Store, StoreError};
