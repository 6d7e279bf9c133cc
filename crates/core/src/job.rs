// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job model and derived status.
//!
//! A job is one client submission: a spec (image + command line), a schedule,
//! and the append-only sequence of executions it has produced. Job status is
//! never stored; it is derived from the schedule, the execution history, and
//! the stop/expire flags, so replayed queue messages cannot drive it
//! backwards.

use crate::execution::{Execution, ExecutionStatus};
use crate::schedule::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

crate::define_id! {
    /// Unique identifier for a job.
    ///
    /// ULID-based: ids minted later sort later, so listing jobs by id yields
    /// submission order.
    pub struct JobId("job-");
}

/// Notification targets carried on the job spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyTargets {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<String>,
}

impl NotifyTargets {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.webhooks.is_empty()
    }
}

/// The execution request: what to run and under which limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub image: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
    /// Opaque mapping passed through to webhooks.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Automatic retry budget beyond the first attempt.
    #[serde(default)]
    pub retries: u32,
    /// Absolute deadline after which the job may not start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_ms: Option<u64>,
    /// Per-execution hard wall-clock limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "NotifyTargets::is_empty")]
    pub notify: NotifyTargets,
}

impl JobSpec {
    pub fn new(image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: command.into(),
            envs: BTreeMap::new(),
            metadata: BTreeMap::new(),
            retries: 0,
            expiration_ms: None,
            timeout_ms: None,
            notify: NotifyTargets::default(),
        }
    }

    crate::setters! {
        set {
            retries: u32,
            envs: BTreeMap<String, String>,
            metadata: BTreeMap<String, serde_json::Value>,
            notify: NotifyTargets,
        }
        option {
            expiration_ms: u64,
            timeout_ms: u64,
        }
    }
}

/// Derived job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// On the jobs queue (or an automatic retry is pending)
    Enqueued,
    /// Waiting on a future trigger
    Scheduled,
    /// An execution is in flight
    Running,
    Done,
    Failed,
    Expired,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Failed | JobStatus::Expired | JobStatus::Stopped
        )
    }
}

crate::simple_display! {
    JobStatus {
        Enqueued => "enqueued",
        Scheduled => "scheduled",
        Running => "running",
        Done => "done",
        Failed => "failed",
        Expired => "expired",
        Stopped => "stopped",
    }
}

/// Terminal-state event kind pushed onto the notify and webhooks queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Done,
    Failed,
    Expired,
    Stopped,
}

crate::simple_display! {
    NoticeKind {
        Done => "done",
        Failed => "failed",
        Expired => "expired",
        Stopped => "stopped",
    }
}

/// A single client submission that yields one or more executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub task_id: String,
    pub spec: JobSpec,
    pub schedule: Schedule,
    /// Append-only; the last entry is the current attempt.
    #[serde(default)]
    pub executions: Vec<Execution>,
    /// Attempt ceiling: `retries + 1`, extended by manual retries and by
    /// each cron trigger.
    pub max_attempts: u32,
    /// Cron triggers suppressed because the previous execution was still
    /// running when they fired.
    #[serde(default)]
    pub skipped_triggers: u32,
    /// Set by the stop operation; observed by the monitor.
    #[serde(default)]
    pub stop_requested: bool,
    /// Set when the expiration deadline passed before the job could start.
    #[serde(default)]
    pub expired: bool,
    pub created_at_ms: u64,
    pub last_modified_at_ms: u64,
}

impl Job {
    pub fn new(task_id: impl Into<String>, spec: JobSpec, schedule: Schedule, now_ms: u64) -> Self {
        let max_attempts = spec.retries + 1;
        Self {
            job_id: JobId::new(),
            task_id: task_id.into(),
            spec,
            schedule,
            executions: Vec::new(),
            max_attempts,
            skipped_triggers: 0,
            stop_requested: false,
            expired: false,
            created_at_ms: now_ms,
            last_modified_at_ms: now_ms,
        }
    }

    pub fn latest_execution(&self) -> Option<&Execution> {
        self.executions.last()
    }

    /// The execution currently in flight, if any.
    ///
    /// The store guarantees at most one non-terminal execution per job.
    pub fn active_execution(&self) -> Option<&Execution> {
        self.executions.last().filter(|e| !e.status.is_terminal())
    }

    /// Whether another automatic attempt fits in the budget.
    pub fn attempts_remaining(&self) -> bool {
        (self.executions.len() as u32) < self.max_attempts
    }

    /// Whether the expiration deadline has passed at `now_ms`.
    pub fn is_past_expiration(&self, now_ms: u64) -> bool {
        self.spec.expiration_ms.is_some_and(|deadline| deadline < now_ms)
    }

    /// Extend the attempt ceiling for a fresh cron trigger: the new trigger
    /// gets its own `retries + 1` budget on top of the attempts already made.
    pub fn extend_attempts_for_trigger(&mut self) {
        self.max_attempts = self.executions.len() as u32 + self.spec.retries + 1;
    }

    /// Extend the attempt ceiling by one for a manual retry.
    pub fn extend_attempts_for_manual_retry(&mut self) {
        self.max_attempts = (self.executions.len() as u32).max(self.max_attempts) + 1;
    }

    /// Derive the job status.
    pub fn status(&self) -> JobStatus {
        if self.expired {
            return JobStatus::Expired;
        }
        if self.stop_requested {
            return JobStatus::Stopped;
        }
        match self.executions.last() {
            Some(exec) if !exec.status.is_terminal() => JobStatus::Running,
            Some(exec) => match exec.status {
                ExecutionStatus::Done => self.rearmed_or(JobStatus::Done),
                ExecutionStatus::Stopped => JobStatus::Stopped,
                ExecutionStatus::Expired => JobStatus::Expired,
                // Failed | Timedout
                _ => {
                    if self.attempts_remaining() {
                        JobStatus::Enqueued
                    } else {
                        self.rearmed_or(JobStatus::Failed)
                    }
                }
            },
            None => match &self.schedule {
                Schedule::Immediate => JobStatus::Enqueued,
                Schedule::At { fired: true, .. } => JobStatus::Enqueued,
                Schedule::At { .. } | Schedule::Cron { .. } => JobStatus::Scheduled,
            },
        }
    }

    /// Scheduled when the cron trigger is re-armed; otherwise `fallback`.
    fn rearmed_or(&self, fallback: JobStatus) -> JobStatus {
        match &self.schedule {
            Schedule::Cron { next_ms: Some(_), .. } => JobStatus::Scheduled,
            _ => fallback,
        }
    }

    /// Terminal event kind for the latest execution, if the job is settled.
    ///
    /// `None` while an execution is live or a retry is still in the budget;
    /// the engine's settle step pushes exactly one notice per settled job.
    pub fn notice_kind(&self) -> Option<NoticeKind> {
        if self.expired {
            return Some(NoticeKind::Expired);
        }
        let exec = self.executions.last()?;
        if !exec.status.is_terminal() {
            return None;
        }
        if self.stop_requested {
            return Some(NoticeKind::Stopped);
        }
        match exec.status {
            ExecutionStatus::Done => Some(NoticeKind::Done),
            ExecutionStatus::Stopped => Some(NoticeKind::Stopped),
            ExecutionStatus::Expired => Some(NoticeKind::Expired),
            ExecutionStatus::Failed | ExecutionStatus::Timedout if !self.attempts_remaining() => {
                Some(NoticeKind::Failed)
            }
            _ => None,
        }
    }

    /// Externally-rendered form of the job, with env values matching the
    /// blacklist redacted. Used for webhook and notify payloads.
    pub fn render(&self, env_blacklist: &[String]) -> serde_json::Value {
        let latest = self.executions.last();
        json!({
            "task_id": self.task_id,
            "job_id": self.job_id,
            "status": self.status(),
            "image": self.spec.image,
            "command": self.spec.command,
            "envs": redact_envs(&self.spec.envs, env_blacklist),
            "metadata": self.spec.metadata,
            "retries": self.spec.retries,
            "schedule": self.schedule,
            "executions": self.executions.len(),
            "skipped_triggers": self.skipped_triggers,
            "exit_code": latest.and_then(|e| e.exit_code),
            "error": latest.and_then(|e| e.error.clone()),
            "created_at_ms": self.created_at_ms,
            "last_modified_at_ms": self.last_modified_at_ms,
        })
    }
}

/// Env names matched (case-insensitive substring) against these fragments
/// are redacted in any externally-rendered form.
pub const DEFAULT_ENV_BLACKLIST: &[&str] = &["password", "secret", "token", "key", "auth"];

const REDACTED: &str = "***";

/// Redact blacklisted env values. The stored spec keeps the real values;
/// only the rendered copy is scrubbed.
pub fn redact_envs(
    envs: &BTreeMap<String, String>,
    blacklist: &[String],
) -> BTreeMap<String, String> {
    envs.iter()
        .map(|(name, value)| {
            let lower = name.to_lowercase();
            let hit = blacklist.iter().any(|frag| lower.contains(&frag.to_lowercase()));
            (name.clone(), if hit { REDACTED.to_string() } else { value.clone() })
        })
        .collect()
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            task_id: String = "test-task",
        }
        set {
            spec: JobSpec = JobSpec::new("alpine", "echo hi"),
            schedule: Schedule = Schedule::Immediate,
            executions: Vec<Execution> = Vec::new(),
            max_attempts: u32 = 1,
            skipped_triggers: u32 = 0,
            stop_requested: bool = false,
            expired: bool = false,
            created_at_ms: u64 = 0,
            last_modified_at_ms: u64 = 0,
        }
        computed {
            job_id: JobId = JobId::new(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
