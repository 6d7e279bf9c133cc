// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The container runtime contract consumed by the runner and monitor.
//!
//! Every method takes the target host ("host:port") so one adapter serves a
//! whole pool. Errors carry their §7 classification: transient failures are
//! released back to the queue, permanent ones fail the execution.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from container runtime operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The host is unreachable or timing out (transient).
    #[error("connection to host {host} failed with error: {reason}")]
    HostUnavailable { host: String, reason: String },
    /// The registry does not have the image (permanent).
    #[error("image not found: {0}")]
    ImageNotFound(String),
    /// The registry refused access to the image (permanent).
    #[error("unauthorized for image: {0}")]
    Unauthorized(String),
    /// The container is gone on the host (permanent).
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    /// The daemon rejected the request (permanent).
    #[error("runtime rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    /// The daemon answered with something we cannot parse (permanent).
    #[error("invalid runtime response: {0}")]
    InvalidResponse(String),
}

impl RuntimeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::HostUnavailable { .. })
    }
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    /// Exited normally; consult `exit_code`.
    Exited,
    /// The daemon killed or lost the container.
    Dead,
    Paused,
    Restarting,
    Removing,
    Unknown,
}

impl ContainerStatus {
    /// Map a Docker `State.Status` string.
    pub fn from_docker(status: &str) -> Self {
        match status {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            _ => ContainerStatus::Unknown,
        }
    }

    /// Whether the container has finished for good.
    pub fn has_exited(&self) -> bool {
        matches!(self, ContainerStatus::Exited | ContainerStatus::Dead)
    }
}

fl_core::simple_display! {
    ContainerStatus {
        Created => "created",
        Running => "running",
        Exited => "exited",
        Dead => "dead",
        Paused => "paused",
        Restarting => "restarting",
        Removing => "removing",
        Unknown => "unknown",
    }
}

/// Snapshot returned by [`ContainerRuntime::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    pub status: ContainerStatus,
    pub exit_code: Option<i64>,
    /// Daemon-reported error (e.g. OOM kill reason), if any.
    pub error: Option<String>,
}

/// Contract any container host driver must provide.
#[async_trait]
pub trait ContainerRuntime: Clone + Send + Sync + 'static {
    /// Pull the image onto the host.
    async fn pull(&self, host: &str, image: &str) -> Result<(), RuntimeError>;

    /// Create a named container; returns the container id.
    async fn create(
        &self,
        host: &str,
        name: &str,
        image: &str,
        command: &str,
        envs: &BTreeMap<String, String>,
    ) -> Result<String, RuntimeError>;

    async fn start(&self, host: &str, container_id: &str) -> Result<(), RuntimeError>;

    async fn stop(&self, host: &str, container_id: &str) -> Result<(), RuntimeError>;

    async fn inspect(&self, host: &str, container_id: &str)
        -> Result<ContainerState, RuntimeError>;

    /// Captured output, bounded to the last `tail` bytes per stream.
    async fn logs(
        &self,
        host: &str,
        container_id: &str,
        tail: usize,
    ) -> Result<(String, String), RuntimeError>;

    /// Rename a container (the monitor stamps finished containers with a
    /// `defunct-` prefix as a pruner hint).
    async fn rename(&self, host: &str, container_id: &str, name: &str)
        -> Result<(), RuntimeError>;

    /// Container ids on the host whose name starts with `name_prefix`.
    async fn list(&self, host: &str, name_prefix: &str) -> Result<Vec<String>, RuntimeError>;

    async fn remove(&self, host: &str, container_id: &str) -> Result<(), RuntimeError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{ContainerRuntime, ContainerState, ContainerStatus, RuntimeError};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// One scripted container on the fake runtime.
    #[derive(Debug, Clone)]
    pub struct FakeContainer {
        pub id: String,
        pub host: String,
        pub name: String,
        pub image: String,
        pub command: String,
        pub envs: BTreeMap<String, String>,
        pub status: ContainerStatus,
        pub exit_code: Option<i64>,
        pub stdout: String,
        pub stderr: String,
        pub error: Option<String>,
        /// Inspections left before the scripted exit applies.
        pub polls_until_exit: Option<u32>,
        pub scripted_exit: Option<(ContainerStatus, i64)>,
    }

    struct Script {
        polls: u32,
        exit_code: i64,
        stdout: String,
        stderr: String,
    }

    #[derive(Default)]
    struct FakeState {
        containers: Vec<FakeContainer>,
        /// Exit scripts consumed by `create`, in order.
        scripted: std::collections::VecDeque<Script>,
        /// Hosts that fail every call with `HostUnavailable`.
        down_hosts: Vec<String>,
        /// Images whose pull fails permanently.
        missing_images: Vec<String>,
        /// Pull failures to serve before pulls start succeeding (transient).
        pull_failures: u32,
        next_id: u64,
        pulls: Vec<(String, String)>,
        stops: Vec<String>,
        removes: Vec<String>,
    }

    /// Scriptable in-memory container runtime for tests.
    ///
    /// Containers run until a scripted exit: on the first inspection
    /// (`script_exit(0, ..)`) or after N of them, which lets tests walk a
    /// monitor through several poll cycles.
    #[derive(Clone, Default)]
    pub struct FakeRuntime {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the next container to exit with `exit_code` after `polls`
        /// inspections, writing the given stdout.
        pub fn script_exit(&self, polls: u32, exit_code: i64, stdout: &str, stderr: &str) {
            let mut state = self.state.lock();
            state.scripted.push_back(Script {
                polls,
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            });
        }

        pub fn set_host_down(&self, host: &str, down: bool) {
            let mut state = self.state.lock();
            state.down_hosts.retain(|h| h != host);
            if down {
                state.down_hosts.push(host.to_string());
            }
        }

        pub fn set_image_missing(&self, image: &str) {
            self.state.lock().missing_images.push(image.to_string());
        }

        /// Make the next `n` pulls fail with a transient error.
        pub fn fail_next_pulls(&self, n: u32) {
            self.state.lock().pull_failures = n;
        }

        pub fn pulls(&self) -> Vec<(String, String)> {
            self.state.lock().pulls.clone()
        }

        pub fn stops(&self) -> Vec<String> {
            self.state.lock().stops.clone()
        }

        pub fn removes(&self) -> Vec<String> {
            self.state.lock().removes.clone()
        }

        pub fn containers(&self) -> Vec<FakeContainer> {
            self.state.lock().containers.clone()
        }

        pub fn container(&self, id: &str) -> Option<FakeContainer> {
            self.state.lock().containers.iter().find(|c| c.id == id).cloned()
        }

        fn check_host(state: &FakeState, host: &str) -> Result<(), RuntimeError> {
            if state.down_hosts.iter().any(|h| h == host) {
                return Err(RuntimeError::HostUnavailable {
                    host: host.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn pull(&self, host: &str, image: &str) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            Self::check_host(&state, host)?;
            if state.pull_failures > 0 {
                state.pull_failures -= 1;
                return Err(RuntimeError::HostUnavailable {
                    host: host.to_string(),
                    reason: "registry timeout".to_string(),
                });
            }
            if state.missing_images.iter().any(|i| i == image) {
                return Err(RuntimeError::ImageNotFound(image.to_string()));
            }
            state.pulls.push((host.to_string(), image.to_string()));
            Ok(())
        }

        async fn create(
            &self,
            host: &str,
            name: &str,
            image: &str,
            command: &str,
            envs: &BTreeMap<String, String>,
        ) -> Result<String, RuntimeError> {
            let mut state = self.state.lock();
            Self::check_host(&state, host)?;
            state.next_id += 1;
            let id = format!("ctr-{:08x}", state.next_id);
            let script = state.scripted.pop_front();
            let (polls_until_exit, scripted_exit, stdout, stderr) = match script {
                Some(s) => (
                    Some(s.polls),
                    Some((ContainerStatus::Exited, s.exit_code)),
                    s.stdout,
                    s.stderr,
                ),
                None => (None, None, String::new(), String::new()),
            };
            state.containers.push(FakeContainer {
                id: id.clone(),
                host: host.to_string(),
                name: name.to_string(),
                image: image.to_string(),
                command: command.to_string(),
                envs: envs.clone(),
                status: ContainerStatus::Created,
                exit_code: None,
                stdout,
                stderr,
                error: None,
                polls_until_exit,
                scripted_exit,
            });
            Ok(id)
        }

        async fn start(&self, host: &str, container_id: &str) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            Self::check_host(&state, host)?;
            let container = state
                .containers
                .iter_mut()
                .find(|c| c.id == container_id)
                .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))?;
            container.status = ContainerStatus::Running;
            Ok(())
        }

        async fn stop(&self, host: &str, container_id: &str) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            Self::check_host(&state, host)?;
            state.stops.push(container_id.to_string());
            let container = state
                .containers
                .iter_mut()
                .find(|c| c.id == container_id)
                .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))?;
            if !container.status.has_exited() {
                container.status = ContainerStatus::Exited;
                container.exit_code = Some(137);
            }
            Ok(())
        }

        async fn inspect(
            &self,
            host: &str,
            container_id: &str,
        ) -> Result<ContainerState, RuntimeError> {
            let mut state = self.state.lock();
            Self::check_host(&state, host)?;
            let container = state
                .containers
                .iter_mut()
                .find(|c| c.id == container_id)
                .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))?;

            // Walk the scripted exit forward one poll.
            if container.status == ContainerStatus::Running {
                if let (Some(left), Some((status, code))) =
                    (container.polls_until_exit, container.scripted_exit)
                {
                    if left == 0 {
                        container.status = status;
                        container.exit_code = Some(code);
                    } else {
                        container.polls_until_exit = Some(left - 1);
                    }
                }
            }

            Ok(ContainerState {
                status: container.status,
                exit_code: container.exit_code,
                error: container.error.clone(),
            })
        }

        async fn logs(
            &self,
            host: &str,
            container_id: &str,
            tail: usize,
        ) -> Result<(String, String), RuntimeError> {
            let state = self.state.lock();
            Self::check_host(&state, host)?;
            let container = state
                .containers
                .iter()
                .find(|c| c.id == container_id)
                .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))?;
            Ok((
                fl_core::tail_bytes(&container.stdout, tail),
                fl_core::tail_bytes(&container.stderr, tail),
            ))
        }

        async fn rename(
            &self,
            host: &str,
            container_id: &str,
            name: &str,
        ) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            Self::check_host(&state, host)?;
            let container = state
                .containers
                .iter_mut()
                .find(|c| c.id == container_id)
                .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))?;
            container.name = name.to_string();
            Ok(())
        }

        async fn list(&self, host: &str, name_prefix: &str) -> Result<Vec<String>, RuntimeError> {
            let state = self.state.lock();
            Self::check_host(&state, host)?;
            Ok(state
                .containers
                .iter()
                .filter(|c| c.host == host && c.name.starts_with(name_prefix))
                .map(|c| c.id.clone())
                .collect())
        }

        async fn remove(&self, host: &str, container_id: &str) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            Self::check_host(&state, host)?;
            state.removes.push(container_id.to_string());
            state.containers.retain(|c| c.id != container_id);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeContainer, FakeRuntime};

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
