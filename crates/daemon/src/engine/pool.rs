// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher host selection: pool matching, concurrency caps, and per-host
//! failure circuits.

use crate::config::PoolConfig;
use fl_storage::{Store, StoreError};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from host selection
#[derive(Debug, Error)]
pub enum PoolError {
    /// The matched pool is at its `max_running` cap; requeue with back-off.
    #[error("pool for task {task_id:?} is saturated ({running}/{max_running})")]
    Saturated { task_id: String, running: usize, max_running: usize },
    /// No enabled host can take the job right now.
    #[error("no available host for task {0:?}")]
    NoHosts(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-host consecutive-failure circuit.
///
/// Closed → open after `threshold` consecutive transient failures; open →
/// half-open after `cooldown`; one success closes it again. Open hosts are
/// skipped by selection exactly like administratively disabled hosts;
/// half-open hosts get offered traffic again.
#[derive(Debug, Default, Clone, Copy)]
struct Circuit {
    consecutive_failures: u32,
    opened_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct CompiledPool {
    matcher: Option<Regex>,
    hosts: Vec<String>,
    max_running: usize,
}

/// The configured pools plus runtime host health.
pub struct HostPool {
    pools: Vec<CompiledPool>,
    disabled: HashSet<String>,
    circuit_threshold: u32,
    circuit_cooldown_ms: u64,
    circuits: Mutex<HashMap<String, Circuit>>,
}

impl HostPool {
    pub fn new(
        pools: &[PoolConfig],
        disabled: &[String],
        circuit_threshold: u32,
        circuit_cooldown: Duration,
    ) -> Result<Self, regex::Error> {
        let mut compiled = Vec::with_capacity(pools.len());
        for pool in pools {
            let matcher = pool.match_expr.as_deref().map(Regex::new).transpose()?;
            let mut hosts = pool.hosts.clone();
            // Deterministic tie-breaking needs a stable order.
            hosts.sort();
            compiled.push(CompiledPool { matcher, hosts, max_running: pool.max_running });
        }
        Ok(Self {
            pools: compiled,
            disabled: disabled.iter().cloned().collect(),
            circuit_threshold,
            circuit_cooldown_ms: circuit_cooldown.as_millis() as u64,
            circuits: Mutex::new(HashMap::new()),
        })
    }

    /// Every configured host (pruner sweep target).
    pub fn all_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> =
            self.pools.iter().flat_map(|p| p.hosts.iter().cloned()).collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    /// Pick a host for a job: first-match pool, least running executions,
    /// ties broken by lowest host id.
    pub async fn select(
        &self,
        task_id: &str,
        store: &Arc<dyn Store>,
        now_ms: u64,
    ) -> Result<String, PoolError> {
        let pool = self
            .pools
            .iter()
            .find(|p| p.matcher.as_ref().map(|m| m.is_match(task_id)).unwrap_or(true))
            .ok_or_else(|| PoolError::NoHosts(task_id.to_string()))?;

        let mut pool_running = 0;
        let mut candidates: Vec<(usize, &String)> = Vec::new();
        for host in &pool.hosts {
            let running = store.count_running_on_host(host).await?;
            pool_running += running;
            if self.host_enabled(host, now_ms) {
                candidates.push((running, host));
            }
        }

        if pool_running >= pool.max_running {
            return Err(PoolError::Saturated {
                task_id: task_id.to_string(),
                running: pool_running,
                max_running: pool.max_running,
            });
        }

        // Hosts are pre-sorted, so min_by_key on the count alone keeps the
        // lexicographic tie-break.
        candidates
            .into_iter()
            .min_by_key(|(running, _)| *running)
            .map(|(_, host)| host.clone())
            .ok_or_else(|| PoolError::NoHosts(task_id.to_string()))
    }

    fn host_enabled(&self, host: &str, now_ms: u64) -> bool {
        if self.disabled.contains(host) {
            return false;
        }
        self.circuit_state(host, now_ms) != CircuitState::Open
    }

    pub fn circuit_state(&self, host: &str, now_ms: u64) -> CircuitState {
        let circuits = self.circuits.lock();
        match circuits.get(host).and_then(|c| c.opened_at_ms) {
            None => CircuitState::Closed,
            Some(opened) if now_ms.saturating_sub(opened) >= self.circuit_cooldown_ms => {
                CircuitState::HalfOpen
            }
            Some(_) => CircuitState::Open,
        }
    }

    /// Record a transient failure against a host; opens the circuit at the
    /// threshold (and re-arms the cooldown if it was half-open).
    pub fn record_failure(&self, host: &str, now_ms: u64) {
        let mut circuits = self.circuits.lock();
        let circuit = circuits.entry(host.to_string()).or_default();
        circuit.consecutive_failures += 1;
        if circuit.consecutive_failures >= self.circuit_threshold {
            if circuit.opened_at_ms.is_none() {
                tracing::warn!(host, failures = circuit.consecutive_failures, "host circuit opened");
            }
            circuit.opened_at_ms = Some(now_ms);
        }
    }

    /// Record a success; closes the circuit.
    pub fn record_success(&self, host: &str) {
        let mut circuits = self.circuits.lock();
        if let Some(circuit) = circuits.get_mut(host) {
            if circuit.opened_at_ms.is_some() {
                tracing::info!(host, "host circuit closed");
            }
            *circuit = Circuit::default();
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
