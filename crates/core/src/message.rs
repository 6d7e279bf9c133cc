// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue names and message payloads.
//!
//! Messages are hints, not facts: every handler re-reads the store and exits
//! cleanly when the store disagrees (a terminal execution, a missing job).
//! Replay of any message is safe.

use crate::execution::ExecutionId;
use crate::job::{JobId, NoticeKind};
use serde::{Deserialize, Serialize};

/// The four named work streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Ready-to-dispatch jobs
    Jobs,
    /// Poll a running execution
    Monitor,
    /// Outbound callbacks
    Webhooks,
    /// Terminal-state side effects
    Notify,
}

impl QueueName {
    pub const ALL: [QueueName; 4] =
        [QueueName::Jobs, QueueName::Monitor, QueueName::Webhooks, QueueName::Notify];
}

crate::simple_display! {
    QueueName {
        Jobs => "jobs",
        Monitor => "monitor",
        Webhooks => "webhooks",
        Notify => "notify",
    }
}

/// Work item payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Dispatch and run the next attempt of a job (`jobs` queue).
    RunJob {
        job_id: JobId,
        /// Times this dispatch has been bounced off a saturated pool.
        #[serde(default)]
        requeues: u32,
    },
    /// Observe a running execution (`monitor` queue).
    PollExecution {
        job_id: JobId,
        execution_id: ExecutionId,
        /// Polls completed so far; drives the monitor-poll back-off.
        #[serde(default)]
        poll_count: u32,
    },
    /// Deliver webhook callbacks for a settled job (`webhooks` queue).
    DeliverWebhooks { job_id: JobId, event: NoticeKind },
    /// Run terminal-state side effects for a settled job (`notify` queue).
    NotifyTerminal { job_id: JobId, event: NoticeKind },
}

impl Message {
    /// Message name for log spans (e.g., "run_job", "poll_execution")
    pub fn name(&self) -> &'static str {
        match self {
            Message::RunJob { .. } => "run_job",
            Message::PollExecution { .. } => "poll_execution",
            Message::DeliverWebhooks { .. } => "deliver_webhooks",
            Message::NotifyTerminal { .. } => "notify_terminal",
        }
    }

    /// The job this message belongs to.
    pub fn job_id(&self) -> &JobId {
        match self {
            Message::RunJob { job_id, .. }
            | Message::PollExecution { job_id, .. }
            | Message::DeliverWebhooks { job_id, .. }
            | Message::NotifyTerminal { job_id, .. } => job_id,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
