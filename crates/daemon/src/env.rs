// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::time::Duration;

/// JSON pool configuration: `[{"match": "regex|null", "hosts": ["h:p"], "maxRunning": N}]`.
pub fn docker_hosts() -> Option<String> {
    std::env::var("DOCKER_HOSTS").ok().filter(|s| !s.is_empty())
}

/// Administratively disabled hosts, comma separated "host:port" entries.
pub fn blacklisted_hosts() -> Vec<String> {
    csv_var("FASTLANE_BLACKLISTED_HOSTS")
}

/// Env-name fragments whose values are redacted in rendered payloads.
pub fn env_blacklist() -> Option<Vec<String>> {
    std::env::var("FASTLANE_ENV_BLACKLIST")
        .ok()
        .map(|s| s.split(',').map(|f| f.trim().to_lowercase()).filter(|f| !f.is_empty()).collect())
}

/// Scheduler sweep period (default 1s).
pub fn tick() -> Option<Duration> {
    ms_var("FASTLANE_TICK_MS")
}

/// Queue visibility timeout (default 30s).
pub fn visibility_timeout() -> Option<Duration> {
    ms_var("FASTLANE_VISIBILITY_TIMEOUT_MS")
}

/// Per-execution log tail in bytes (default 2 MiB).
pub fn log_tail_bytes() -> Option<usize> {
    std::env::var("FASTLANE_LOG_TAIL_BYTES").ok().and_then(|s| s.parse().ok())
}

/// Worker tasks per queue (default 4).
pub fn workers_per_queue() -> Option<usize> {
    std::env::var("FASTLANE_WORKERS_PER_QUEUE").ok().and_then(|s| s.parse().ok())
}

/// External key-value backend, parsed by the wiring layer.
pub fn redis_url() -> Option<String> {
    std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty())
}

/// External document store backend, parsed by the wiring layer.
pub fn mongodb_config() -> Option<String> {
    std::env::var("MONGODB_CONFIG").ok().filter(|s| !s.is_empty())
}

fn ms_var(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

fn csv_var(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|s| s.split(',').map(|h| h.trim().to_string()).filter(|h| !h.is_empty()).collect())
        .unwrap_or_default()
}
