// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine unit tests.

use super::{Engine, EngineDeps, WorkerMetrics};
use crate::config::{Config, PoolConfig};
use fl_adapters::{FakeNotifier, FakeRuntime};
use fl_core::{FakeClock, QueueName};
use fl_storage::{MemoryStore, QueueSet};
use std::sync::Arc;

pub(crate) struct TestEngine {
    pub engine: Engine<FakeRuntime, FakeNotifier, FakeClock>,
    pub clock: FakeClock,
    pub runtime: FakeRuntime,
    pub notifier: FakeNotifier,
    pub store: MemoryStore,
    pub metrics: WorkerMetrics,
}

pub(crate) fn single_host_config() -> Config {
    Config {
        pools: vec![PoolConfig {
            match_expr: None,
            hosts: vec!["h1:2375".to_string()],
            max_running: 10,
        }],
        ..Config::default()
    }
}

pub(crate) fn test_engine(config: Config) -> TestEngine {
    let clock = FakeClock::new();
    let runtime = FakeRuntime::new();
    let notifier = FakeNotifier::new();
    let store = MemoryStore::new();
    let deps = EngineDeps {
        runtime: runtime.clone(),
        notifier: notifier.clone(),
        store: Arc::new(store.clone()),
        queues: QueueSet::in_memory(clock.clone()),
    };
    let engine = Engine::new(deps, clock.clone(), config).expect("engine config");
    TestEngine { engine, clock, runtime, notifier, store, metrics: WorkerMetrics::default() }
}

impl TestEngine {
    /// Step every queue until a full pass processes nothing. Messages whose
    /// visibility time is still in the future stay put.
    pub async fn drain(&self) -> usize {
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

    /// Advance the fake clock and drain, repeatedly, simulating `total_ms`
    /// of wall-clock in `step_ms` slices with a scheduler sweep per slice.
    pub async fn run_for(&self, total_ms: u64, step_ms: u64) {
        let mut elapsed = 0;
        while elapsed < total_ms {
            self.clock.advance_ms(step_ms);
            elapsed += step_ms;
            self.engine.scheduler_tick().await.expect("scheduler tick");
            self.drain().await;
        }
    }
}
