// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serde roundtrips for every queue message variant.

use crate::execution::ExecutionId;
use crate::job::{JobId, NoticeKind};
use crate::message::{Message, QueueName};

fn all_messages() -> Vec<Message> {
    let job_id = JobId::from_string("job-1");
    vec![
        Message::RunJob { job_id, requeues: 0 },
        Message::PollExecution {
            job_id,
            execution_id: ExecutionId::from_string("exe-1"),
            poll_count: 3,
        },
        Message::DeliverWebhooks { job_id, event: NoticeKind::Done },
        Message::NotifyTerminal { job_id, event: NoticeKind::Failed },
    ]
}

#[test]
fn every_variant_roundtrips() {
    for msg in all_messages() {
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg, "{}", json);
    }
}

#[test]
fn payloads_are_kind_tagged() {
    let msg = Message::RunJob { job_id: JobId::from_string("job-1"), requeues: 2 };
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["kind"], "run_job");
    assert_eq!(json["requeues"], 2);
}

#[test]
fn defaults_fill_missing_counters() {
    let msg: Message =
        serde_json::from_str(r#"{"kind":"run_job","job_id":"job-1"}"#).unwrap();
    assert_eq!(msg, Message::RunJob { job_id: JobId::from_string("job-1"), requeues: 0 });
}

#[test]
fn queue_names_display_as_wire_names() {
    let names: Vec<String> = QueueName::ALL.iter().map(|q| q.to_string()).collect();
    assert_eq!(names, ["jobs", "monitor", "webhooks", "notify"]);
}
