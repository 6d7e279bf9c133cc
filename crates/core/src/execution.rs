// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution records: one container invocation attempt for a job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

crate::define_id! {
    /// Unique identifier for a single execution attempt.
    ///
    /// Executions are ordered within their job by `attempt`; the ID itself is
    /// globally unique and used to key idempotent queue handlers.
    pub struct ExecutionId("exe-");
}

/// Status of a single execution attempt.
///
/// Transitions are monotone within one execution: `pulling → created →
/// running → terminal`, never backwards. The store enforces this with
/// compare-and-set; see [`ExecutionStatus::can_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Image pull in progress
    Pulling,
    /// Container created, not yet started
    Created,
    /// Container running
    Running,
    /// Exited with code 0
    Done,
    /// Exited non-zero, or the runtime reported the container dead
    Failed,
    /// Wall-clock limit exceeded; container stopped by the monitor
    Timedout,
    /// Stopped by operator request
    Stopped,
    /// Job expired before the attempt could run
    Expired,
}

impl ExecutionStatus {
    /// Check if this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Done
                | ExecutionStatus::Failed
                | ExecutionStatus::Timedout
                | ExecutionStatus::Stopped
                | ExecutionStatus::Expired
        )
    }

    /// Whether `next` is a legal forward transition from this status.
    pub fn can_transition(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (Pulling, Created | Failed | Stopped | Expired) => true,
            (Created, Running | Failed | Stopped) => true,
            (Running, Done | Failed | Timedout | Stopped) => true,
            _ => false,
        }
    }
}

crate::simple_display! {
    ExecutionStatus {
        Pulling => "pulling",
        Created => "created",
        Running => "running",
        Done => "done",
        Failed => "failed",
        Timedout => "timedout",
        Stopped => "stopped",
        Expired => "expired",
    }
}

/// One container invocation attempt for a job.
///
/// Image, command, and envs are frozen from the job spec at creation so a
/// later `update` cannot change an attempt that is already in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: ExecutionId,
    /// Zero-based position in the job's execution sequence.
    pub attempt: u32,
    /// Set once the container has been created on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// The host this attempt was dispatched to ("host:port").
    pub container_host: String,
    pub image: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    /// Create a fresh attempt in `pulling` state, ready for the runner.
    pub fn new(
        attempt: u32,
        container_host: impl Into<String>,
        image: impl Into<String>,
        command: impl Into<String>,
        envs: BTreeMap<String, String>,
    ) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            attempt,
            container_id: None,
            container_host: container_host.into(),
            image: image.into(),
            command: command.into(),
            envs,
            status: ExecutionStatus::Pulling,
            started_at_ms: None,
            finished_at_ms: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
        }
    }

    /// Container name for this attempt, also used as the pruner hint base.
    pub fn container_name(&self) -> String {
        format!("fastlane-job-{}", self.execution_id)
    }

    /// Elapsed wall-clock in milliseconds at `now_ms`, once started.
    pub fn elapsed_ms(&self, now_ms: u64) -> Option<u64> {
        self.started_at_ms.map(|s| now_ms.saturating_sub(s))
    }

    /// Combine a runtime error with captured stderr into the stored
    /// human-readable error: `"{error}\n\nstderr:\n{stderr}"`.
    pub fn combined_error(error: Option<&str>, stderr: &str) -> Option<String> {
        match (error, stderr.is_empty()) {
            (Some(e), false) => Some(format!("{}\n\nstderr:\n{}", e, stderr)),
            (Some(e), true) => Some(e.to_string()),
            (None, false) => Some(stderr.to_string()),
            (None, true) => None,
        }
    }

    /// Truncate stored logs to the last `tail` bytes each.
    ///
    /// Applied to older executions when a new attempt is appended; the
    /// latest execution keeps its logs verbatim up to the capture tail.
    pub fn truncate_logs(&mut self, tail: usize) {
        self.stdout = tail_bytes(&self.stdout, tail);
        self.stderr = tail_bytes(&self.stderr, tail);
    }
}

/// Last `n` bytes of `s`, respecting char boundaries.
pub fn tail_bytes(s: &str, n: usize) -> String {
    if s.len() <= n {
        return s.to_string();
    }
    let mut start = s.len() - n;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

crate::builder! {
    pub struct ExecutionBuilder => Execution {
        into {
            container_host: String = "localhost:2375",
            image: String = "alpine",
            command: String = "echo hi",
        }
        set {
            attempt: u32 = 0,
            status: ExecutionStatus = ExecutionStatus::Running,
            envs: BTreeMap<String, String> = BTreeMap::new(),
            stdout: String = String::new(),
            stderr: String = String::new(),
        }
        option {
            container_id: String = None,
            started_at_ms: u64 = None,
            finished_at_ms: u64 = None,
            exit_code: i64 = None,
            error: String = None,
        }
        computed {
            execution_id: ExecutionId = ExecutionId::new(),
        }
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
