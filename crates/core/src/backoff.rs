// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential back-off schedules.
//!
//! Three distinct schedules live in the engine (monitor polling, failed-job
//! retry, saturated-pool requeue), each with its own constants. They are
//! kept separate on purpose; do not collapse them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An exponential back-off schedule: `delay = min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base_ms: base.as_millis() as u64, max_ms: max.as_millis() as u64 }
    }

    /// Delay between monitor polls of a running execution: 1s doubling to 30s.
    pub const fn monitor_poll() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    /// Delay before re-running a failed or timed-out job: 5s doubling to 10m.
    pub const fn retry() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(600))
    }

    /// Delay before re-offering a job to a saturated pool: 2s doubling to 2m.
    pub const fn pool_saturated() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(120))
    }

    /// Delay for the given zero-based attempt, capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self.base_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
