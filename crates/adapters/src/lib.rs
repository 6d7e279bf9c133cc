// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fl-adapters: the seams between the engine and the outside world.
//!
//! - [`ContainerRuntime`]: pull/create/start/inspect/logs contract consumed
//!   by the runner and monitor, with a Docker Engine API implementation and
//!   a scriptable fake.
//! - [`Notifier`]: terminal-state side effects, webhook delivery, and the
//!   error channel.

pub mod docker;
pub mod notify;
pub mod runtime;

pub use docker::DockerRuntime;
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifier, NotifierCall};
pub use notify::{JobNotice, LogNotifier, Notifier, NotifyError, WebhookNotifier};
#[cfg(any(test, feature = "test-support"))]
pub use runtime::{FakeContainer, FakeRuntime};
pub use runtime::{ContainerRuntime, ContainerState, ContainerStatus, RuntimeError};
