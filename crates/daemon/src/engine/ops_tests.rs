// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the core operations the API layer consumes.

use crate::engine::test_helpers::{single_host_config, test_engine};
use crate::engine::EngineError;
use fl_core::{JobSpec, JobStatus, NoticeKind, Schedule};
use fl_storage::Queue;

#[tokio::test]
async fn create_immediate_enqueues_and_creates_task() {
    let t = test_engine(single_host_config());
    let job = t
        .engine
        .create_job("reports", JobSpec::new("alpine", "echo hi"), Schedule::Immediate)
        .await
        .unwrap();

    assert_eq!(job.status(), JobStatus::Enqueued);
    assert_eq!(t.engine.queues().jobs.depth().await.unwrap(), 1);
    assert!(t.engine.store().get_task("reports").await.is_ok());
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let t = test_engine(single_host_config());

    let err = t
        .engine
        .create_job("bad task id!", JobSpec::new("alpine", "true"), Schedule::Immediate)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = t
        .engine
        .create_job("ok", JobSpec::new("", "true"), Schedule::Immediate)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // A bad cron never reaches the store: Schedule::cron refuses it first.
    assert!(Schedule::cron("not a cron").is_err());
    assert_eq!(t.engine.queues().jobs.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn update_rejects_in_flight_job() {
    let t = test_engine(single_host_config());
    t.runtime.script_exit(1_000, 0, "", "");
    let job = t
        .engine
        .create_job("u", JobSpec::new("alpine", "sleep 5"), Schedule::Immediate)
        .await
        .unwrap();
    t.drain().await;

    let err = t
        .engine
        .update_job(&job.job_id, JobSpec::new("alpine", "echo other"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn update_replaces_spec_and_budget() {
    let t = test_engine(single_host_config());
    let job = t
        .engine
        .create_job(
            "u",
            JobSpec::new("alpine", "true"),
            Schedule::At { when_ms: u64::MAX, fired: false },
        )
        .await
        .unwrap();

    let updated = t
        .engine
        .update_job(&job.job_id, JobSpec::new("alpine", "echo v2").retries(2))
        .await
        .unwrap();
    assert_eq!(updated.spec.command, "echo v2");
    assert_eq!(updated.max_attempts, 3);
}

#[tokio::test]
async fn stop_running_job_flips_flag_and_nudges_monitor() {
    let t = test_engine(single_host_config());
    t.runtime.script_exit(1_000, 0, "partial\n", "");
    let job = t
        .engine
        .create_job("s", JobSpec::new("alpine", "sleep 60"), Schedule::Immediate)
        .await
        .unwrap();
    t.drain().await;

    let stopped = t.engine.stop_job(&job.job_id).await.unwrap();
    assert!(stopped.stop_requested);
    assert_eq!(stopped.status(), JobStatus::Stopped);

    // The nudged monitor observes the flag, stops the container, finalizes.
    t.drain().await;
    let stored = t.engine.store().get_job(&job.job_id).await.unwrap();
    let exec = stored.latest_execution().unwrap();
    assert_eq!(exec.status, fl_core::ExecutionStatus::Stopped);
    assert_eq!(exec.stdout, "partial\n", "logs captured on stop");
    assert_eq!(t.runtime.stops().len(), 1);
    assert!(t.notifier.notices().contains(&NoticeKind::Stopped));
}

#[tokio::test]
async fn stop_terminal_job_is_conflict() {
    let t = test_engine(single_host_config());
    t.runtime.script_exit(0, 0, "", "");
    let job = t
        .engine
        .create_job("s", JobSpec::new("alpine", "true"), Schedule::Immediate)
        .await
        .unwrap();
    t.drain().await;
    t.clock.advance_ms(1_000);
    t.drain().await;

    let err = t.engine.stop_job(&job.job_id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn retry_done_job_runs_again() {
    let t = test_engine(single_host_config());
    t.runtime.script_exit(0, 0, "first\n", "");
    let job = t
        .engine
        .create_job("r", JobSpec::new("alpine", "true"), Schedule::Immediate)
        .await
        .unwrap();
    t.drain().await;
    t.clock.advance_ms(1_000);
    t.drain().await;

    let stored = t.engine.store().get_job(&job.job_id).await.unwrap();
    assert_eq!(stored.status(), JobStatus::Done);

    // Manual retry extends the bound by one and re-dispatches.
    t.runtime.script_exit(0, 0, "second\n", "");
    let retried = t.engine.retry_job(&job.job_id).await.unwrap();
    assert_eq!(retried.max_attempts, 2);

    t.drain().await;
    t.clock.advance_ms(1_000);
    t.drain().await;

    let stored = t.engine.store().get_job(&job.job_id).await.unwrap();
    assert_eq!(stored.executions.len(), 2);
    assert_eq!(stored.status(), JobStatus::Done);
    let (stdout, _) = t.engine.job_logs(&job.job_id).await.unwrap();
    assert_eq!(stdout, "second\n");
}

#[tokio::test]
async fn retry_in_flight_job_is_conflict() {
    let t = test_engine(single_host_config());
    t.runtime.script_exit(1_000, 0, "", "");
    let job = t
        .engine
        .create_job("r", JobSpec::new("alpine", "sleep 60"), Schedule::Immediate)
        .await
        .unwrap();
    t.drain().await;

    let err = t.engine.retry_job(&job.job_id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn missing_job_is_not_found() {
    let t = test_engine(single_host_config());
    let missing = fl_core::JobId::from_string("job-missing");
    assert!(matches!(
        t.engine.job_logs(&missing).await.unwrap_err(),
        EngineError::NotFound(_)
    ));
    assert!(matches!(
        t.engine.stop_job(&missing).await.unwrap_err(),
        EngineError::NotFound(_)
    ));
}
