// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker Engine API implementation of [`ContainerRuntime`].
//!
//! Talks plain HTTP to each pool host's Docker daemon over TCP. Commands run
//! under `/bin/sh -c` so the job command line keeps its shell semantics.

pub mod http;

use crate::runtime::{ContainerRuntime, ContainerState, ContainerStatus, RuntimeError};
use async_trait::async_trait;
use http::{demux_log_stream, urlencode, HttpResponse};
use serde_json::json;
use std::collections::BTreeMap;

/// Seconds Docker waits between SIGTERM and SIGKILL on stop.
const STOP_GRACE_SECS: u32 = 5;

/// Container runtime backed by the Docker Engine HTTP API (v1.41+).
#[derive(Clone, Default)]
pub struct DockerRuntime;

impl DockerRuntime {
    pub fn new() -> Self {
        Self
    }

    fn check(
        resp: HttpResponse,
        context: impl FnOnce(u16, String) -> RuntimeError,
    ) -> Result<HttpResponse, RuntimeError> {
        if resp.is_success() {
            Ok(resp)
        } else {
            let body = resp.body_string();
            Err(context(resp.status, body))
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull(&self, host: &str, image: &str) -> Result<(), RuntimeError> {
        let (name, tag) = split_image_tag(image);
        let path = format!(
            "/images/create?fromImage={}&tag={}",
            urlencode(name),
            urlencode(tag)
        );
        let resp = http::request(host, "POST", &path, None).await?;
        let resp = Self::check(resp, |status, body| match status {
            404 => RuntimeError::ImageNotFound(image.to_string()),
            401 | 403 => RuntimeError::Unauthorized(image.to_string()),
            500..=599 => RuntimeError::HostUnavailable { host: host.to_string(), reason: body },
            _ => RuntimeError::Rejected { status, body },
        })?;
        // The pull endpoint streams progress JSON and still answers 200 when
        // the pull breaks partway; the failure only shows up as a trailing
        // error line in the stream.
        if let Some(message) = stream_error(&resp.body) {
            return Err(classify_pull_error(host, image, &message));
        }
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
        let env: Vec<String> = envs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let body = json!({
            "Image": image,
            "Cmd": ["/bin/sh", "-c", command],
            "Env": env,
            "Labels": { "fastlane": "true" },
        })
        .to_string();
        let path = format!("/containers/create?name={}", urlencode(name));
        let resp = http::request(host, "POST", &path, Some(&body)).await?;
        let resp = Self::check(resp, |status, body| match status {
            404 => RuntimeError::ImageNotFound(image.to_string()),
            _ => RuntimeError::Rejected { status, body },
        })?;

        let parsed: serde_json::Value = serde_json::from_slice(&resp.body)
            .map_err(|e| RuntimeError::InvalidResponse(format!("create response: {}", e)))?;
        parsed["Id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RuntimeError::InvalidResponse("create response missing Id".to_string()))
    }

    async fn start(&self, host: &str, container_id: &str) -> Result<(), RuntimeError> {
        let path = format!("/containers/{}/start", container_id);
        let resp = http::request(host, "POST", &path, None).await?;
        Self::check(resp, |status, body| match status {
            404 => RuntimeError::ContainerNotFound(container_id.to_string()),
            _ => RuntimeError::Rejected { status, body },
        })?;
        Ok(())
    }

    async fn stop(&self, host: &str, container_id: &str) -> Result<(), RuntimeError> {
        let path = format!("/containers/{}/stop?t={}", container_id, STOP_GRACE_SECS);
        let resp = http::request(host, "POST", &path, None).await?;
        Self::check(resp, |status, body| match status {
            404 => RuntimeError::ContainerNotFound(container_id.to_string()),
            _ => RuntimeError::Rejected { status, body },
        })?;
        Ok(())
    }

    async fn inspect(
        &self,
        host: &str,
        container_id: &str,
    ) -> Result<ContainerState, RuntimeError> {
        let path = format!("/containers/{}/json", container_id);
        let resp = http::request(host, "GET", &path, None).await?;
        let resp = Self::check(resp, |status, body| match status {
            404 => RuntimeError::ContainerNotFound(container_id.to_string()),
            _ => RuntimeError::Rejected { status, body },
        })?;

        let parsed: serde_json::Value = serde_json::from_slice(&resp.body)
            .map_err(|e| RuntimeError::InvalidResponse(format!("inspect response: {}", e)))?;
        let state = &parsed["State"];
        let status =
            ContainerStatus::from_docker(state["Status"].as_str().unwrap_or("unknown"));
        let exit_code = if status.has_exited() { state["ExitCode"].as_i64() } else { None };
        let error = state["Error"].as_str().filter(|s| !s.is_empty()).map(|s| s.to_string());
        Ok(ContainerState { status, exit_code, error })
    }

    async fn logs(
        &self,
        host: &str,
        container_id: &str,
        tail: usize,
    ) -> Result<(String, String), RuntimeError> {
        let path = format!("/containers/{}/logs?stdout=1&stderr=1&timestamps=0", container_id);
        let resp = http::request(host, "GET", &path, None).await?;
        let resp = Self::check(resp, |status, body| match status {
            404 => RuntimeError::ContainerNotFound(container_id.to_string()),
            _ => RuntimeError::Rejected { status, body },
        })?;
        let (stdout, stderr) = demux_log_stream(&resp.body);
        Ok((fl_core::tail_bytes(&stdout, tail), fl_core::tail_bytes(&stderr, tail)))
    }

    async fn rename(
        &self,
        host: &str,
        container_id: &str,
        name: &str,
    ) -> Result<(), RuntimeError> {
        let path = format!("/containers/{}/rename?name={}", container_id, urlencode(name));
        let resp = http::request(host, "POST", &path, None).await?;
        Self::check(resp, |status, body| match status {
            404 => RuntimeError::ContainerNotFound(container_id.to_string()),
            _ => RuntimeError::Rejected { status, body },
        })?;
        Ok(())
    }

    async fn list(&self, host: &str, name_prefix: &str) -> Result<Vec<String>, RuntimeError> {
        let resp = http::request(host, "GET", "/containers/json?all=1", None).await?;
        let resp = Self::check(resp, |status, body| RuntimeError::Rejected { status, body })?;

        let parsed: serde_json::Value = serde_json::from_slice(&resp.body)
            .map_err(|e| RuntimeError::InvalidResponse(format!("list response: {}", e)))?;
        let containers = parsed
            .as_array()
            .ok_or_else(|| RuntimeError::InvalidResponse("list response not an array".into()))?;

        let mut ids = Vec::new();
        for container in containers {
            // Names come back as ["/defunct-fastlane-job-…"].
            let matched = container["Names"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|n| n.as_str())
                .any(|n| n.trim_start_matches('/').starts_with(name_prefix));
            if matched {
                if let Some(id) = container["Id"].as_str() {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    async fn remove(&self, host: &str, container_id: &str) -> Result<(), RuntimeError> {
        let path = format!("/containers/{}?force=1", container_id);
        let resp = http::request(host, "DELETE", &path, None).await?;
        Self::check(resp, |status, body| match status {
            404 => RuntimeError::ContainerNotFound(container_id.to_string()),
            _ => RuntimeError::Rejected { status, body },
        })?;
        Ok(())
    }
}

/// Split "repo/image:tag" into (name, tag), defaulting the tag to "latest".
/// The split must not eat a registry port ("registry:5000/img").
fn split_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

/// Last `error` field in a newline-delimited JSON progress stream.
fn stream_error(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    text.lines().rev().find_map(|line| {
        let parsed: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
        parsed["error"].as_str().map(|s| s.to_string())
    })
}

/// Classify a mid-stream pull failure by its message, mirroring the status
/// mapping the registry would have used had it failed up front.
fn classify_pull_error(host: &str, image: &str, message: &str) -> RuntimeError {
    let lower = message.to_lowercase();
    if lower.contains("not found")
        || lower.contains("manifest unknown")
        || lower.contains("does not exist")
    {
        return RuntimeError::ImageNotFound(image.to_string());
    }
    if lower.contains("unauthorized")
        || lower.contains("denied")
        || lower.contains("authentication")
    {
        return RuntimeError::Unauthorized(image.to_string());
    }
    if lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("temporar")
        || lower.contains("tls handshake")
        || lower.contains("too many requests")
        || lower.contains("rate limit")
    {
        return RuntimeError::HostUnavailable {
            host: host.to_string(),
            reason: message.to_string(),
        };
    }
    RuntimeError::Rejected { status: 200, body: message.to_string() }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
