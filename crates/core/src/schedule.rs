// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job schedules: immediate, run-at, and recurring cron triggers.
//!
//! Cron expressions are standard five-field (minute, hour, day-of-month,
//! month, day-of-week) and are evaluated in UTC. The stored `next_ms` is the
//! commit point for the scheduler: advancing it consumes the trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors from schedule parsing and evaluation
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(u64),
}

/// When a job becomes due.
///
/// Tagged variants with explicit payloads per tag; serialized into the job
/// document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Due as soon as it is created
    Immediate,
    /// Due once, at an absolute time
    At {
        when_ms: u64,
        /// Set when the trigger has been consumed (the atomic advance).
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        fired: bool,
    },
    /// Due on every matching cron tick
    Cron {
        expr: String,
        /// Next trigger time; `None` until armed.
        next_ms: Option<u64>,
    },
}

impl Schedule {
    /// Create a cron schedule, validating the expression.
    pub fn cron(expr: impl Into<String>) -> Result<Self, ScheduleError> {
        let expr = expr.into();
        parse_cron(&expr)?;
        Ok(Schedule::Cron { expr, next_ms: None })
    }

    /// The earliest-visible time for this schedule, if one is pending.
    pub fn next_trigger_ms(&self) -> Option<u64> {
        match self {
            Schedule::Immediate => None,
            Schedule::At { fired: true, .. } => None,
            Schedule::At { when_ms, .. } => Some(*when_ms),
            Schedule::Cron { next_ms, .. } => *next_ms,
        }
    }

    /// Whether a future trigger is pending.
    pub fn is_pending(&self) -> bool {
        self.next_trigger_ms().is_some()
    }

    pub fn is_cron(&self) -> bool {
        matches!(self, Schedule::Cron { .. })
    }

    /// Arm the next trigger from the current time.
    ///
    /// For cron this computes the next matching tick strictly after `now_ms`;
    /// no-op for `Immediate` and `At`.
    pub fn arm(&mut self, now_ms: u64) -> Result<(), ScheduleError> {
        if let Schedule::Cron { expr, next_ms } = self {
            *next_ms = cron_next_after(expr, now_ms)?;
        }
        Ok(())
    }

    /// Consume a due trigger: the atomic advance that commits an enqueue.
    ///
    /// Returns `true` when the schedule was due at `now_ms` and the trigger
    /// was taken (cron: `next_ms` advanced; at: marked fired). A schedule
    /// whose trigger is in the future is untouched and returns `false`.
    pub fn take_due(&mut self, now_ms: u64) -> Result<bool, ScheduleError> {
        match self.next_trigger_ms() {
            Some(trigger) if trigger <= now_ms => {}
            _ => return Ok(false),
        }
        match self {
            Schedule::At { fired, .. } => *fired = true,
            Schedule::Cron { expr, next_ms } => {
                *next_ms = cron_next_after(expr, now_ms)?;
            }
            Schedule::Immediate => unreachable!("immediate schedules have no trigger"),
        }
        Ok(true)
    }
}

crate::simple_display! {
    Schedule {
        Immediate => "immediate",
        At {..} => "at",
        Cron {..} => "cron",
    }
}

/// Parse a five-field cron expression (UTC).
///
/// The `cron` crate wants a seconds field, so we pin seconds to `0` before
/// handing the expression over.
fn parse_cron(expr: &str) -> Result<cron::Schedule, ScheduleError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(ScheduleError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("expected 5 fields, got {}", fields),
        });
    }
    cron::Schedule::from_str(&format!("0 {}", expr)).map_err(|e| ScheduleError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Validate a cron expression without building a schedule.
pub fn validate_cron(expr: &str) -> Result<(), ScheduleError> {
    parse_cron(expr).map(|_| ())
}

/// Next cron tick strictly after `now_ms`, in epoch milliseconds (UTC).
///
/// `None` when the expression has no future match (e.g. a fixed Feb 30 date).
pub fn cron_next_after(expr: &str, now_ms: u64) -> Result<Option<u64>, ScheduleError> {
    let schedule = parse_cron(expr)?;
    let now = epoch_ms_to_utc(now_ms)?;
    Ok(schedule.after(&now).next().map(|dt| dt.timestamp_millis() as u64))
}

fn epoch_ms_to_utc(ms: u64) -> Result<DateTime<Utc>, ScheduleError> {
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .ok_or(ScheduleError::TimestampOutOfRange(ms))
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
