// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{classify_pull_error, split_image_tag, stream_error};
use crate::runtime::RuntimeError;

#[test]
fn image_tag_splitting() {
    assert_eq!(split_image_tag("alpine"), ("alpine", "latest"));
    assert_eq!(split_image_tag("alpine:3.20"), ("alpine", "3.20"));
    assert_eq!(split_image_tag("registry:5000/img"), ("registry:5000/img", "latest"));
    assert_eq!(split_image_tag("registry:5000/img:v2"), ("registry:5000/img", "v2"));
}

#[test]
fn clean_pull_stream_has_no_error() {
    let body = concat!(
        "{\"status\":\"Pulling from library/alpine\"}\n",
        "{\"status\":\"Downloading\",\"progressDetail\":{\"current\":512}}\n",
        "{\"status\":\"Pull complete\"}\n",
    );
    assert_eq!(stream_error(body.as_bytes()), None);
}

#[test]
fn trailing_error_line_is_surfaced() {
    // A 200 response whose stream died partway: progress lines, then the
    // error line the daemon appends.
    let body = concat!(
        "{\"status\":\"Pulling from library/alpine\"}\n",
        "{\"status\":\"Downloading\",\"progressDetail\":{\"current\":512}}\n",
        "{\"error\":\"unexpected EOF\",\"errorDetail\":{\"message\":\"unexpected EOF\"}}\n",
    );
    assert_eq!(stream_error(body.as_bytes()).as_deref(), Some("unexpected EOF"));
}

#[test]
fn stream_error_skips_unparseable_lines() {
    let body = b"not json at all\n{\"error\":\"manifest unknown\"}\n\n";
    assert_eq!(stream_error(body).as_deref(), Some("manifest unknown"));
}

#[test]
fn pull_errors_classify_by_message() {
    let host = "h1:2375";
    let image = "ghost:latest";

    assert!(matches!(
        classify_pull_error(host, image, "manifest unknown: manifest unknown"),
        RuntimeError::ImageNotFound(_)
    ));
    assert!(matches!(
        classify_pull_error(host, image, "pull access denied for ghost"),
        RuntimeError::Unauthorized(_)
    ));

    let err = classify_pull_error(host, image, "Get registry-1.docker.io: TLS handshake timeout");
    assert!(err.is_transient(), "{}", err);
    assert!(matches!(err, RuntimeError::HostUnavailable { .. }));

    let err = classify_pull_error(host, image, "toomanyrequests: rate limit exceeded");
    assert!(err.is_transient(), "{}", err);

    assert!(matches!(
        classify_pull_error(host, image, "filesystem layer verification failed"),
        RuntimeError::Rejected { status: 200, .. }
    ));
}
