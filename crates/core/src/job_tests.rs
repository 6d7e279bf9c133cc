// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for derived job status, attempt budgets, and env redaction.

use crate::execution::{Execution, ExecutionStatus};
use crate::job::{redact_envs, Job, JobSpec, JobStatus, NoticeKind};
use crate::schedule::Schedule;
use std::collections::BTreeMap;

fn exec(status: ExecutionStatus) -> Execution {
    Execution::builder().status(status).build()
}

#[test]
fn fresh_immediate_job_is_enqueued() {
    let job = Job::builder().build();
    assert_eq!(job.status(), JobStatus::Enqueued);
}

#[test]
fn fresh_scheduled_job_is_scheduled() {
    let job = Job::builder()
        .schedule(Schedule::At { when_ms: 10_000, fired: false })
        .build();
    assert_eq!(job.status(), JobStatus::Scheduled);
}

#[test]
fn live_execution_means_running() {
    for status in [ExecutionStatus::Pulling, ExecutionStatus::Created, ExecutionStatus::Running] {
        let job = Job::builder().executions(vec![exec(status)]).build();
        assert_eq!(job.status(), JobStatus::Running, "{}", status);
    }
}

#[test]
fn done_execution_means_done() {
    let job = Job::builder().executions(vec![exec(ExecutionStatus::Done)]).build();
    assert_eq!(job.status(), JobStatus::Done);
    assert_eq!(job.notice_kind(), Some(NoticeKind::Done));
}

#[test]
fn failed_with_budget_left_is_enqueued() {
    let job = Job::builder()
        .max_attempts(3)
        .executions(vec![exec(ExecutionStatus::Failed)])
        .build();
    assert_eq!(job.status(), JobStatus::Enqueued);
    assert!(job.attempts_remaining());
    assert_eq!(job.notice_kind(), None, "not terminal while retries remain");
}

#[test]
fn failed_with_budget_exhausted_is_failed() {
    let job = Job::builder()
        .max_attempts(1)
        .executions(vec![exec(ExecutionStatus::Timedout)])
        .build();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.notice_kind(), Some(NoticeKind::Failed));
}

#[test]
fn stop_requested_wins() {
    let job = Job::builder()
        .stop_requested(true)
        .executions(vec![exec(ExecutionStatus::Running)])
        .build();
    assert_eq!(job.status(), JobStatus::Stopped);
    assert_eq!(job.notice_kind(), None, "not settled until the monitor observes the stop");
}

#[test]
fn stop_requested_notice_is_stopped_even_after_failure() {
    // A failure that lands while a stop is pending settles as stopped, with
    // no retry.
    let job = Job::builder()
        .stop_requested(true)
        .max_attempts(3)
        .executions(vec![exec(ExecutionStatus::Failed)])
        .build();
    assert_eq!(job.notice_kind(), Some(NoticeKind::Stopped));
}

#[test]
fn expired_wins_over_everything() {
    let job = Job::builder()
        .expired(true)
        .stop_requested(true)
        .executions(vec![exec(ExecutionStatus::Done)])
        .build();
    assert_eq!(job.status(), JobStatus::Expired);
    assert_eq!(job.notice_kind(), Some(NoticeKind::Expired));
}

#[test]
fn rearmed_cron_is_scheduled_after_done() {
    let job = Job::builder()
        .schedule(Schedule::Cron { expr: "* * * * *".into(), next_ms: Some(60_000) })
        .executions(vec![exec(ExecutionStatus::Done)])
        .build();
    assert_eq!(job.status(), JobStatus::Scheduled);
}

#[test]
fn new_job_budget_is_retries_plus_one() {
    let spec = JobSpec::new("alpine", "true").retries(2);
    let job = Job::new("t", spec, Schedule::Immediate, 0);
    assert_eq!(job.max_attempts, 3);
}

#[test]
fn cron_trigger_extends_budget() {
    let mut job = Job::builder()
        .max_attempts(1)
        .executions(vec![exec(ExecutionStatus::Done)])
        .build();
    assert!(!job.attempts_remaining());

    job.extend_attempts_for_trigger();
    assert_eq!(job.max_attempts, 2);
    assert!(job.attempts_remaining());
}

#[test]
fn manual_retry_extends_budget_by_one() {
    let mut job = Job::builder()
        .max_attempts(1)
        .executions(vec![exec(ExecutionStatus::Done)])
        .build();
    job.extend_attempts_for_manual_retry();
    assert_eq!(job.max_attempts, 2);
}

#[test]
fn expiration_check_uses_deadline() {
    let spec = JobSpec::new("alpine", "true").expiration_ms(5_000u64);
    let job = Job::new("t", spec, Schedule::Immediate, 0);
    assert!(!job.is_past_expiration(5_000));
    assert!(job.is_past_expiration(5_001));
}

#[test]
fn redaction_matches_name_fragments_case_insensitively() {
    let mut envs = BTreeMap::new();
    envs.insert("DB_PASSWORD".to_string(), "hunter2".to_string());
    envs.insert("ApiToken".to_string(), "abc".to_string());
    envs.insert("PLAIN".to_string(), "visible".to_string());

    let blacklist = vec!["password".to_string(), "token".to_string()];
    let redacted = redact_envs(&envs, &blacklist);

    assert_eq!(redacted["DB_PASSWORD"], "***");
    assert_eq!(redacted["ApiToken"], "***");
    assert_eq!(redacted["PLAIN"], "visible");
}

#[test]
fn render_redacts_but_spec_keeps_values() {
    let mut envs = BTreeMap::new();
    envs.insert("SECRET_SAUCE".to_string(), "mayo".to_string());
    let spec = JobSpec::new("alpine", "true").envs(envs);
    let job = Job::builder().spec(spec).build();

    let rendered = job.render(&["secret".to_string()]);
    assert_eq!(rendered["envs"]["SECRET_SAUCE"], "***");
    assert_eq!(job.spec.envs["SECRET_SAUCE"], "mayo");
}

#[test]
fn render_includes_latest_exit_code() {
    let job = Job::builder()
        .executions(vec![Execution::builder()
            .status(ExecutionStatus::Done)
            .exit_code(0)
            .build()])
        .build();
    let rendered = job.render(&[]);
    assert_eq!(rendered["exit_code"], 0);
    assert_eq!(rendered["status"], "done");
}
