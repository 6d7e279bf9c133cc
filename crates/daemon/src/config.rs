// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Pool layout comes from `DOCKER_HOSTS` (JSON); the remaining knobs are
//! `FASTLANE_*` environment variables with working defaults.

use fl_core::Backoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::env;

/// Errors from configuration parsing
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid DOCKER_HOSTS: {0}")]
    InvalidDockerHosts(String),
    #[error("invalid pool match regex {expr:?}: {reason}")]
    InvalidPoolMatch { expr: String, reason: String },
}

/// One host pool: jobs whose task id matches `match` run on `hosts`, at most
/// `max_running` at a time across the pool. A pool without `match` is the
/// default pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_expr: Option<String>,
    pub hosts: Vec<String>,
    #[serde(rename = "maxRunning")]
    pub max_running: usize,
}

/// Full daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub pools: Vec<PoolConfig>,
    /// Administratively disabled hosts.
    pub blacklisted_hosts: Vec<String>,
    /// Env-name fragments redacted in rendered payloads.
    pub env_blacklist: Vec<String>,
    /// Scheduler sweep period.
    pub tick: Duration,
    /// Queue visibility timeout.
    pub visibility_timeout: Duration,
    /// Per-handler execution timeout inside a worker.
    pub handler_timeout: Duration,
    /// Delay before the first monitor poll of a started execution.
    pub initial_monitor_delay: Duration,
    /// Log capture bound per stream, in bytes.
    pub log_tail_bytes: usize,
    pub workers_per_queue: usize,
    /// Transient redeliveries before a message is dropped and reported.
    pub max_deliveries: u32,
    pub pruner_interval: Duration,
    /// Consecutive transient failures before a host circuit opens.
    pub circuit_threshold: u32,
    /// How long an open circuit stays open before half-opening.
    pub circuit_cooldown: Duration,
    pub monitor_backoff: Backoff,
    pub retry_backoff: Backoff,
    pub saturation_backoff: Backoff,
    /// External backend endpoints, consumed by the wiring layer.
    pub redis_url: Option<String>,
    pub mongodb_config: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pools: vec![PoolConfig {
                match_expr: None,
                hosts: vec!["localhost:2375".to_string()],
                max_running: 2,
            }],
            blacklisted_hosts: Vec::new(),
            env_blacklist: fl_core::job::DEFAULT_ENV_BLACKLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tick: Duration::from_secs(1),
            visibility_timeout: Duration::from_secs(30),
            handler_timeout: Duration::from_secs(120),
            initial_monitor_delay: Duration::from_secs(1),
            log_tail_bytes: 2 * 1024 * 1024,
            workers_per_queue: 4,
            max_deliveries: 5,
            pruner_interval: Duration::from_secs(60),
            circuit_threshold: 3,
            circuit_cooldown: Duration::from_secs(30),
            monitor_backoff: Backoff::monitor_poll(),
            retry_backoff: Backoff::retry(),
            saturation_backoff: Backoff::pool_saturated(),
            redis_url: None,
            mongodb_config: None,
        }
    }
}

impl Config {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(json) = env::docker_hosts() {
            config.pools = parse_docker_hosts(&json)?;
        }
        config.blacklisted_hosts = env::blacklisted_hosts();
        if let Some(blacklist) = env::env_blacklist() {
            config.env_blacklist = blacklist;
        }
        if let Some(tick) = env::tick() {
            config.tick = tick;
        }
        if let Some(vt) = env::visibility_timeout() {
            config.visibility_timeout = vt;
        }
        if let Some(tail) = env::log_tail_bytes() {
            config.log_tail_bytes = tail;
        }
        if let Some(workers) = env::workers_per_queue() {
            config.workers_per_queue = workers;
        }
        config.redis_url = env::redis_url();
        config.mongodb_config = env::mongodb_config();
        Ok(config)
    }
}

/// Parse the `DOCKER_HOSTS` pool JSON and validate every match regex.
pub fn parse_docker_hosts(json: &str) -> Result<Vec<PoolConfig>, ConfigError> {
    let pools: Vec<PoolConfig> =
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidDockerHosts(e.to_string()))?;
    for pool in &pools {
        if let Some(expr) = &pool.match_expr {
            regex::Regex::new(expr).map_err(|e| ConfigError::InvalidPoolMatch {
                expr: expr.clone(),
                reason: e.to_string(),
            })?;
        }
    }
    Ok(pools)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
