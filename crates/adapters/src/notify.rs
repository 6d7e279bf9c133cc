// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The notifier seam: terminal-state side effects, webhook callbacks, and
//! the error channel.

use async_trait::async_trait;
use fl_core::{JobId, NoticeKind};
use thiserror::Error;

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The target is unreachable or timing out (transient; redeliver).
    #[error("notify target unreachable: {0}")]
    Unreachable(String),
    /// The target answered and said no (permanent; drop after reporting).
    #[error("notify target rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Unreachable(_))
    }
}

/// Terminal-state notice rendered from a job (envs already redacted).
#[derive(Debug, Clone)]
pub struct JobNotice {
    pub kind: NoticeKind,
    pub task_id: String,
    pub job_id: JobId,
    pub emails: Vec<String>,
    pub payload: serde_json::Value,
}

/// Adapter for notification side-channels.
#[async_trait]
pub trait Notifier: Clone + Send + Sync + 'static {
    /// Deliver a terminal-state notice (email and friends).
    async fn notify(&self, notice: &JobNotice) -> Result<(), NotifyError>;

    /// POST a job payload to one webhook URL.
    async fn webhook(&self, url: &str, payload: &serde_json::Value) -> Result<(), NotifyError>;

    /// Error reporter channel; must never fail the caller.
    async fn error(&self, context: &str, message: &str);
}

/// Notifier that only writes to the log. The default when no webhook client
/// is configured, and the reference for the out-of-scope email side-channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &JobNotice) -> Result<(), NotifyError> {
        tracing::info!(
            job_id = %notice.job_id,
            task_id = %notice.task_id,
            kind = %notice.kind,
            emails = notice.emails.len(),
            "job notice"
        );
        Ok(())
    }

    async fn webhook(&self, url: &str, _payload: &serde_json::Value) -> Result<(), NotifyError> {
        tracing::info!(%url, "webhook delivery skipped (log notifier)");
        Ok(())
    }

    async fn error(&self, context: &str, message: &str) {
        tracing::error!(context, message, "worker error");
    }
}

/// Notifier that delivers webhooks over HTTP and logs the rest.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notice: &JobNotice) -> Result<(), NotifyError> {
        LogNotifier.notify(notice).await
    }

    async fn webhook(&self, url: &str, payload: &serde_json::Value) -> Result<(), NotifyError> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Unreachable(e.to_string()))?;

        let status = response.status();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if status.is_success() {
            tracing::info!(%url, status = status.as_u16(), elapsed_ms, "webhook delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            // 5xx: the endpoint exists but is struggling; worth a redelivery.
            return Err(NotifyError::Unreachable(format!("{} from {}", status, url)));
        }
        Err(NotifyError::Rejected { status: status.as_u16(), body })
    }

    async fn error(&self, context: &str, message: &str) {
        tracing::error!(context, message, "worker error");
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{JobNotice, Notifier, NotifyError};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded notifier interaction
    #[derive(Debug, Clone)]
    pub enum NotifierCall {
        Notice { kind: fl_core::NoticeKind, job_id: fl_core::JobId },
        Webhook { url: String, payload: serde_json::Value },
        Error { context: String, message: String },
    }

    #[derive(Default)]
    struct FakeNotifierState {
        calls: Vec<NotifierCall>,
        webhook_failures: u32,
    }

    /// Fake notifier recording every call for assertions.
    #[derive(Clone, Default)]
    pub struct FakeNotifier {
        inner: Arc<Mutex<FakeNotifierState>>,
    }

    impl FakeNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` webhook deliveries fail transiently.
        pub fn fail_next_webhooks(&self, n: u32) {
            self.inner.lock().webhook_failures = n;
        }

        pub fn calls(&self) -> Vec<NotifierCall> {
            self.inner.lock().calls.clone()
        }

        pub fn notices(&self) -> Vec<fl_core::NoticeKind> {
            self.inner
                .lock()
                .calls
                .iter()
                .filter_map(|c| match c {
                    NotifierCall::Notice { kind, .. } => Some(*kind),
                    _ => None,
                })
                .collect()
        }

        pub fn webhook_urls(&self) -> Vec<String> {
            self.inner
                .lock()
                .calls
                .iter()
                .filter_map(|c| match c {
                    NotifierCall::Webhook { url, .. } => Some(url.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn errors(&self) -> Vec<(String, String)> {
            self.inner
                .lock()
                .calls
                .iter()
                .filter_map(|c| match c {
                    NotifierCall::Error { context, message } => {
                        Some((context.clone(), message.clone()))
                    }
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl Notifier for FakeNotifier {
        async fn notify(&self, notice: &JobNotice) -> Result<(), NotifyError> {
            self.inner.lock().calls.push(NotifierCall::Notice {
                kind: notice.kind,
                job_id: notice.job_id,
            });
            Ok(())
        }

        async fn webhook(
            &self,
            url: &str,
            payload: &serde_json::Value,
        ) -> Result<(), NotifyError> {
            let mut state = self.inner.lock();
            if state.webhook_failures > 0 {
                state.webhook_failures -= 1;
                return Err(NotifyError::Unreachable("scripted failure".to_string()));
            }
            state.calls.push(NotifierCall::Webhook {
                url: url.to_string(),
                payload: payload.clone(),
            });
            Ok(())
        }

        async fn error(&self, context: &str, message: &str) {
            self.inner.lock().calls.push(NotifierCall::Error {
                context: context.to_string(),
                message: message.to_string(),
            });
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifier, NotifierCall};

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
