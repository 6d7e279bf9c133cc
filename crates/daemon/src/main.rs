// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fastlane daemon entry point.
//!
//! Wires the engine to its adapters, heals orphaned executions, starts the
//! worker pool, and drains on SIGTERM/SIGINT.

use anyhow::{Context, Result};
use clap::Parser;
use fl_adapters::{DockerRuntime, WebhookNotifier};
use fl_core::SystemClock;
use fl_daemon::engine::{Engine, WorkerPool};
use fl_daemon::{Config, EngineDeps};
use fl_storage::{MemoryStore, QueueSet};
use fs2::FileExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fastlane", about = "Container-backed job execution service", version)]
struct Args {
    /// Pool configuration JSON (overrides DOCKER_HOSTS)
    #[arg(long)]
    docker_hosts: Option<String>,

    /// Worker tasks per queue
    #[arg(long)]
    workers: Option<usize>,

    /// Lock file preventing a second master on this machine
    #[arg(long, default_value = "/tmp/fastlane.lock")]
    lock_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(json) = &args.docker_hosts {
        config.pools = fl_daemon::config::parse_docker_hosts(json)?;
    }
    if let Some(workers) = args.workers {
        config.workers_per_queue = workers;
    }

    // Single-master guard: hold an exclusive lock for the process lifetime.
    // Use OpenOptions to avoid truncating the file before we hold the lock,
    // which would wipe the running daemon's PID.
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&args.lock_path)
        .with_context(|| format!("opening lock file {}", args.lock_path.display()))?;
    lock_file
        .try_lock_exclusive()
        .context("another fastlane daemon is already running")?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    if config.redis_url.is_some() || config.mongodb_config.is_some() {
        tracing::warn!(
            "external backend endpoints configured; this build wires the in-memory reference backend"
        );
    }

    let clock = SystemClock;
    let deps = EngineDeps {
        runtime: DockerRuntime::new(),
        notifier: WebhookNotifier::new(),
        store: Arc::new(MemoryStore::new()),
        queues: QueueSet::in_memory(clock.clone()),
    };
    let engine = Arc::new(Engine::new(deps, clock, config)?);

    // Re-observe anything a previous crash left non-terminal.
    let healed = engine.heal().await?;
    tracing::info!(healed, hosts = ?engine_hosts(&engine), "fastlane daemon started");

    let pool = WorkerPool::spawn(Arc::clone(&engine));

    wait_for_shutdown().await;
    tracing::info!("shutdown signal received, draining");
    pool.shutdown().await;
    Ok(())
}

fn engine_hosts<R, N, C>(engine: &Engine<R, N, C>) -> Vec<String>
where
    R: fl_adapters::ContainerRuntime,
    N: fl_adapters::Notifier,
    C: fl_core::Clock,
{
    engine.host_pool().all_hosts()
}

async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
