// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end lifecycle scenarios, driven deterministically with the fake
//! clock, fake runtime, and the in-memory backend.

use fl_adapters::{FakeNotifier, FakeRuntime};
use fl_core::{
    ExecutionStatus, FakeClock, JobSpec, JobStatus, Message, NoticeKind, QueueName, Schedule,
};
use fl_daemon::engine::{Engine, WorkerMetrics};
use fl_daemon::{Config, EngineDeps, PoolConfig};
use fl_storage::{MemoryStore, Queue, QueueSet, Store};
use std::sync::Arc;

struct Harness {
    engine: Engine<FakeRuntime, FakeNotifier, FakeClock>,
    clock: FakeClock,
    runtime: FakeRuntime,
    notifier: FakeNotifier,
    store: MemoryStore,
    metrics: WorkerMetrics,
}

fn single_host_config(max_running: usize) -> Config {
    Config {
        pools: vec![PoolConfig {
            match_expr: None,
            hosts: vec!["h1:2375".to_string()],
            max_running,
        }],
        ..Config::default()
    }
}

impl Harness {
    fn new(config: Config) -> Self {
        Self::with_parts(config, MemoryStore::new(), FakeRuntime::new(), FakeClock::new())
    }

    /// Build a harness over existing backends: fresh queues, fresh engine.
    /// This is what "restart after crash" looks like: the store and the
    /// containers survive, the queue hints do not.
    fn with_parts(
        config: Config,
        store: MemoryStore,
        runtime: FakeRuntime,
        clock: FakeClock,
    ) -> Self {
        let notifier = FakeNotifier::new();
        let deps = EngineDeps {
            runtime: runtime.clone(),
            notifier: notifier.clone(),
            store: Arc::new(store.clone()),
            queues: QueueSet::in_memory(clock.clone()),
        };
        let engine = Engine::new(deps, clock.clone(), config).expect("engine config");
        Self { engine, clock, runtime, notifier, store, metrics: WorkerMetrics::default() }
    }

    /// Step every queue until a full pass processes nothing.
    async fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            let mut progressed = false;
            for name in QueueName::ALL {
                while self.engine.step(name, &self.metrics).await.expect("step") {
                    processed += 1;
                    progressed = true;
                    assert!(processed < 1_000, "drain did not converge");
                }
            }
            if !progressed {
                return processed;
            }
        }
    }

    /// Simulate `total_ms` of wall clock in 1s slices: advance, sweep, drain.
    async fn run_for(&self, total_ms: u64) {
        let mut elapsed = 0;
        while elapsed < total_ms {
            self.clock.advance_ms(1_000);
            elapsed += 1_000;
            self.engine.scheduler_tick().await.expect("tick");
            self.drain().await;
        }
    }

    async fn job(&self, job_id: &fl_core::JobId) -> fl_core::Job {
        self.store.get_job(job_id).await.expect("job")
    }
}

// ── Scenario 1: immediate success ─────────────────────────────────────

#[tokio::test]
async fn immediate_success() {
    let h = Harness::new(single_host_config(10));
    h.runtime.script_exit(0, 0, "hi\n", "");

    let job = h
        .engine
        .create_job("scenario", JobSpec::new("alpine", "echo hi"), Schedule::Immediate)
        .await
        .unwrap();

    h.drain().await; // dispatch + start
    h.run_for(2_000).await; // first monitor poll observes the exit

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.status(), JobStatus::Done);
    assert_eq!(stored.executions.len(), 1);

    let exec = &stored.executions[0];
    assert_eq!(exec.status, ExecutionStatus::Done);
    assert_eq!(exec.exit_code, Some(0));
    assert_eq!(exec.stdout, "hi\n");
    assert!(exec.started_at_ms.is_some() && exec.finished_at_ms.is_some());

    assert_eq!(h.notifier.notices(), vec![NoticeKind::Done]);
    assert_eq!(h.runtime.pulls().len(), 1);
}

// ── Scenario 2: retry then success ────────────────────────────────────

#[tokio::test]
async fn retry_then_success() {
    let h = Harness::new(single_host_config(10));
    h.runtime.script_exit(0, 1, "", "first attempt broke\n");
    h.runtime.script_exit(0, 0, "recovered\n", "");

    let spec = JobSpec::new("alpine", "flaky").retries(2);
    let job = h.engine.create_job("scenario", spec, Schedule::Immediate).await.unwrap();

    // First attempt fails; the retry is delayed by the retry back-off (5s),
    // then the second attempt succeeds.
    h.run_for(10_000).await;

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.status(), JobStatus::Done);
    assert_eq!(stored.executions.len(), 2);
    assert_eq!(stored.executions[0].status, ExecutionStatus::Failed);
    assert_eq!(
        stored.executions[0].error.as_deref(),
        Some("first attempt broke\n"),
        "stderr becomes the error when the runtime reports none"
    );
    assert_eq!(stored.executions[1].status, ExecutionStatus::Done);
    assert_eq!(stored.executions[1].exit_code, Some(0));
    assert_eq!(stored.executions[1].stdout, "recovered\n");

    // Only the final settle notifies.
    assert_eq!(h.notifier.notices(), vec![NoticeKind::Done]);
}

// ── Scenario 3: timeout ───────────────────────────────────────────────

#[tokio::test]
async fn timeout_stops_the_container() {
    let h = Harness::new(single_host_config(10));
    h.runtime.script_exit(1_000, 0, "", ""); // never exits on its own

    let spec = JobSpec::new("alpine", "sleep 60").timeout_ms(2_000u64);
    let job = h.engine.create_job("scenario", spec, Schedule::Immediate).await.unwrap();

    h.drain().await;
    h.run_for(3_000).await;

    let stored = h.job(&job.job_id).await;
    let exec = stored.latest_execution().unwrap();
    assert_eq!(exec.status, ExecutionStatus::Timedout);
    assert_eq!(h.runtime.stops().len(), 1, "monitor stopped the container");

    let elapsed = exec.finished_at_ms.unwrap() - exec.started_at_ms.unwrap();
    assert!(elapsed <= 3_000, "timed out within 3s, took {}ms", elapsed);

    // No retry budget: terminal failed.
    assert_eq!(stored.status(), JobStatus::Failed);
    assert_eq!(h.notifier.notices(), vec![NoticeKind::Failed]);
}

#[tokio::test]
async fn timeout_respects_retry_budget() {
    let h = Harness::new(single_host_config(10));
    h.runtime.script_exit(1_000, 0, "", "");
    h.runtime.script_exit(1_000, 0, "", "");

    let spec = JobSpec::new("alpine", "sleep 60").timeout_ms(2_000u64).retries(1);
    let job = h.engine.create_job("scenario", spec, Schedule::Immediate).await.unwrap();

    // Enough time for: run+timeout (~3s), retry back-off (5s), run+timeout.
    h.run_for(15_000).await;

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.executions.len(), 2);
    assert!(stored
        .executions
        .iter()
        .all(|e| e.status == ExecutionStatus::Timedout));
    assert_eq!(stored.status(), JobStatus::Failed);
}

// ── Scenario 4: cron skip on overlap ──────────────────────────────────

#[tokio::test]
async fn cron_skips_overlapping_trigger() {
    let h = Harness::new(single_host_config(10));
    // First run takes ~90s of wall clock (exit observed on the 7th poll,
    // past the minute-2 trigger); the second run exits immediately.
    h.runtime.script_exit(6, 0, "", "");
    h.runtime.script_exit(0, 0, "", "");

    let job = h
        .engine
        .create_job("cron", JobSpec::new("alpine", "slow"), Schedule::cron("* * * * *").unwrap())
        .await
        .unwrap();

    h.run_for(185_000).await;

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.executions.len(), 2, "minute-1 and minute-3 triggers ran");
    assert_eq!(stored.skipped_triggers, 1, "minute-2 trigger was suppressed");
    assert_eq!(stored.executions[0].status, ExecutionStatus::Done);
}

// ── Scenario 5: pool saturation ───────────────────────────────────────

#[tokio::test]
async fn saturated_pool_serializes_jobs() {
    let h = Harness::new(single_host_config(1));
    // A runs ~4s (exit on the 3rd poll at t+4); B exits on first poll.
    h.runtime.script_exit(2, 0, "", "");
    h.runtime.script_exit(0, 0, "", "");

    let a = h
        .engine
        .create_job("pool", JobSpec::new("alpine", "sleep 5"), Schedule::Immediate)
        .await
        .unwrap();
    let b = h
        .engine
        .create_job("pool", JobSpec::new("alpine", "sleep 5"), Schedule::Immediate)
        .await
        .unwrap();

    // Drive in slices, checking the cap after every step.
    for _ in 0..20 {
        h.clock.advance_ms(1_000);
        h.engine.scheduler_tick().await.unwrap();
        h.drain().await;
        let running = h.store.count_running_on_host("h1:2375").await.unwrap();
        assert!(running <= 1, "pool cap exceeded: {} running", running);
    }

    let job_a = h.job(&a.job_id).await;
    let job_b = h.job(&b.job_id).await;
    assert_eq!(job_a.status(), JobStatus::Done);
    assert_eq!(job_b.status(), JobStatus::Done);

    let a_finished = job_a.executions[0].finished_at_ms.unwrap();
    let b_started = job_b.executions[0].started_at_ms.unwrap();
    assert!(
        b_started >= a_finished,
        "B started at {} before A finished at {}",
        b_started,
        a_finished
    );
    assert!(
        b_started >= job_a.executions[0].started_at_ms.unwrap() + 4_000,
        "B started less than the length of A after A"
    );
}

// ── Scenario 6: crash recovery ────────────────────────────────────────

#[tokio::test]
async fn crash_recovery_resumes_without_duplicates() {
    let config = single_host_config(10);
    let h = Harness::new(config.clone());
    h.runtime.script_exit(3, 0, "survived\n", "");

    let job = h
        .engine
        .create_job("recover", JobSpec::new("alpine", "sleep 30"), Schedule::Immediate)
        .await
        .unwrap();
    h.drain().await;

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.status(), JobStatus::Running);

    // Crash: workers and queues are gone, the store and containers survive.
    let h2 = Harness::with_parts(config, h.store.clone(), h.runtime.clone(), h.clock.clone());
    assert_eq!(h2.engine.queues().monitor.depth().await.unwrap(), 0, "hints lost");

    let healed = h2.engine.heal().await.unwrap();
    assert_eq!(healed, 1);

    h2.run_for(30_000).await;

    let stored = h2.job(&job.job_id).await;
    assert_eq!(stored.status(), JobStatus::Done);
    assert_eq!(stored.executions.len(), 1, "no duplicate attempt");
    assert_eq!(stored.executions[0].stdout, "survived\n", "logs preserved");
    assert_eq!(h2.notifier.notices(), vec![NoticeKind::Done]);
}

#[tokio::test]
async fn healer_redrives_execution_without_container() {
    let config = single_host_config(10);
    let h = Harness::new(config.clone());
    // Pull fails transiently, leaving a pulling execution with no container;
    // the message would be redelivered, but the "crash" loses it.
    h.runtime.fail_next_pulls(1);
    h.runtime.script_exit(0, 0, "late\n", "");

    let job = h
        .engine
        .create_job("recover", JobSpec::new("alpine", "true"), Schedule::Immediate)
        .await
        .unwrap();
    h.drain().await;

    let stored = h.job(&job.job_id).await;
    let exec = stored.latest_execution().unwrap();
    assert_eq!(exec.status, ExecutionStatus::Pulling);
    assert!(exec.container_id.is_none());

    let h2 = Harness::with_parts(config, h.store.clone(), h.runtime.clone(), h.clock.clone());
    h2.engine.heal().await.unwrap();
    h2.run_for(5_000).await;

    let stored = h2.job(&job.job_id).await;
    assert_eq!(stored.status(), JobStatus::Done);
    assert_eq!(stored.executions.len(), 1);
}

// ── Idempotence and store-wins ────────────────────────────────────────

#[tokio::test]
async fn duplicate_monitor_messages_settle_once() {
    let h = Harness::new(single_host_config(10));
    h.runtime.script_exit(0, 0, "once\n", "");

    let job = h
        .engine
        .create_job("dup", JobSpec::new("alpine", "true"), Schedule::Immediate)
        .await
        .unwrap();
    h.drain().await;

    let stored = h.job(&job.job_id).await;
    let exec = stored.latest_execution().unwrap();

    // Inject a duplicate of the pending monitor message.
    h.engine
        .queues()
        .monitor
        .push(
            Message::PollExecution {
                job_id: job.job_id,
                execution_id: exec.execution_id,
                poll_count: 0,
            },
            std::time::Duration::ZERO,
        )
        .await
        .unwrap();

    h.run_for(2_000).await;

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.executions.len(), 1);
    assert_eq!(stored.status(), JobStatus::Done);
    // Exactly one settle: one notice, despite two monitor deliveries.
    assert_eq!(h.notifier.notices(), vec![NoticeKind::Done]);
}

#[tokio::test]
async fn attempt_budget_bounds_executions() {
    let h = Harness::new(single_host_config(10));
    for _ in 0..5 {
        h.runtime.script_exit(0, 7, "", "kaput\n");
    }

    let spec = JobSpec::new("alpine", "false").retries(2);
    let job = h.engine.create_job("budget", spec, Schedule::Immediate).await.unwrap();

    h.run_for(60_000).await;

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.executions.len(), 3, "retries + 1");
    assert_eq!(stored.status(), JobStatus::Failed);
    assert_eq!(h.notifier.notices(), vec![NoticeKind::Failed]);
}

#[tokio::test]
async fn webhooks_are_delivered_with_redacted_envs() {
    let h = Harness::new(single_host_config(10));
    h.runtime.script_exit(0, 0, "", "");

    let mut envs = std::collections::BTreeMap::new();
    envs.insert("API_TOKEN".to_string(), "sekrit".to_string());
    envs.insert("REGION".to_string(), "eu-1".to_string());
    let mut notify = fl_core::NotifyTargets::default();
    notify.webhooks.push("http://hooks.test/done".to_string());

    let spec = JobSpec::new("alpine", "true").envs(envs).notify(notify);
    let job = h.engine.create_job("hooks", spec, Schedule::Immediate).await.unwrap();

    h.run_for(2_000).await;

    assert_eq!(h.notifier.webhook_urls(), vec!["http://hooks.test/done"]);
    let calls = h.notifier.calls();
    let payload = calls
        .iter()
        .find_map(|c| match c {
            fl_adapters::NotifierCall::Webhook { payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(payload["job_id"], job.job_id.as_str());
    assert_eq!(payload["event"], "done");
    assert_eq!(payload["envs"]["API_TOKEN"], "***", "token redacted");
    assert_eq!(payload["envs"]["REGION"], "eu-1");
}

#[tokio::test]
async fn transient_webhook_failures_are_redelivered() {
    let h = Harness::new(single_host_config(10));
    h.runtime.script_exit(0, 0, "", "");
    h.notifier.fail_next_webhooks(1);

    let mut notify = fl_core::NotifyTargets::default();
    notify.webhooks.push("http://hooks.test/flaky".to_string());
    let spec = JobSpec::new("alpine", "true").notify(notify);
    h.engine.create_job("hooks", spec, Schedule::Immediate).await.unwrap();

    h.run_for(2_000).await;
    // First delivery failed and the message was released; it reappears after
    // the visibility timeout.
    assert!(h.notifier.webhook_urls().is_empty());

    h.run_for(35_000).await;
    assert_eq!(h.notifier.webhook_urls(), vec!["http://hooks.test/flaky"]);
}
