// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP/1.1 client for the Docker Engine API over TCP.
//!
//! One request per connection (`Connection: close`), which keeps the parser
//! small: status line, headers, then a body that is either length-delimited,
//! chunked, or read to EOF.

use crate::runtime::RuntimeError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A parsed HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 304
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Issue a request against the Docker daemon at `addr` ("host:port").
pub async fn request(
    addr: &str,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<HttpResponse, RuntimeError> {
    let body = body.unwrap_or("");
    let raw = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len(),
    );
    tokio::time::timeout(REQUEST_TIMEOUT, send(addr, &raw))
        .await
        .map_err(|_| RuntimeError::HostUnavailable {
            host: addr.to_string(),
            reason: "request timed out".to_string(),
        })?
}

async fn send(addr: &str, raw: &str) -> Result<HttpResponse, RuntimeError> {
    let unavailable = |reason: String| RuntimeError::HostUnavailable {
        host: addr.to_string(),
        reason,
    };

    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| unavailable(format!("TCP connect failed: {}", e)))?;
    stream
        .write_all(raw.as_bytes())
        .await
        .map_err(|e| unavailable(format!("write failed: {}", e)))?;

    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .await
        .map_err(|e| unavailable(format!("read failed: {}", e)))?;

    parse_response(&buf)
}

/// Parse a full HTTP/1.1 response held in memory.
pub fn parse_response(raw: &[u8]) -> Result<HttpResponse, RuntimeError> {
    let header_end = find_header_end(raw)
        .ok_or_else(|| RuntimeError::InvalidResponse("missing header terminator".to_string()))?;
    let head = String::from_utf8_lossy(&raw[..header_end]);
    let mut lines = head.split("\r\n");

    let status_line = lines
        .next()
        .ok_or_else(|| RuntimeError::InvalidResponse("empty response".to_string()))?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            RuntimeError::InvalidResponse(format!("bad status line: {}", status_line))
        })?;

    let mut content_length: Option<usize> = None;
    let mut chunked = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => content_length = value.trim().parse().ok(),
            "transfer-encoding" => chunked = value.trim().eq_ignore_ascii_case("chunked"),
            _ => {}
        }
    }

    let rest = &raw[header_end + 4..];
    let body = if chunked {
        decode_chunked(rest)?
    } else if let Some(len) = content_length {
        rest.get(..len)
            .ok_or_else(|| RuntimeError::InvalidResponse("truncated body".to_string()))?
            .to_vec()
    } else {
        rest.to_vec()
    };

    Ok(HttpResponse { status, body })
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn decode_chunked(mut rest: &[u8]) -> Result<Vec<u8>, RuntimeError> {
    let truncated = || RuntimeError::InvalidResponse("truncated chunked body".to_string());
    let mut body = Vec::new();
    loop {
        let line_end = rest.windows(2).position(|w| w == b"\r\n").ok_or_else(truncated)?;
        let size_str = String::from_utf8_lossy(&rest[..line_end]);
        let size = usize::from_str_radix(size_str.trim(), 16)
            .map_err(|_| RuntimeError::InvalidResponse(format!("bad chunk size: {}", size_str)))?;
        rest = &rest[line_end + 2..];
        if size == 0 {
            return Ok(body);
        }
        body.extend_from_slice(rest.get(..size).ok_or_else(truncated)?);
        rest = rest.get(size + 2..).ok_or_else(truncated)?;
    }
}

/// Demultiplex a Docker log stream into (stdout, stderr).
///
/// Attached non-TTY containers return 8-byte frame headers: stream type,
/// three zero bytes, then a big-endian u32 payload length.
pub fn demux_log_stream(raw: &[u8]) -> (String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut rest = raw;
    while rest.len() >= 8 {
        let kind = rest[0];
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let Some(payload) = rest.get(8..8 + len) else { break };
        match kind {
            1 => stdout.extend_from_slice(payload),
            2 => stderr.extend_from_slice(payload),
            _ => {}
        }
        rest = &rest[8 + len..];
    }
    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

/// Percent-encode a query value (container names, image refs).
pub fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
