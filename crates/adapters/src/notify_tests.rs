// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::notify::{FakeNotifier, JobNotice, Notifier, NotifyError};
use fl_core::{JobId, NoticeKind};

fn notice(kind: NoticeKind) -> JobNotice {
    JobNotice {
        kind,
        task_id: "t".to_string(),
        job_id: JobId::from_string("job-1"),
        emails: vec![],
        payload: serde_json::json!({}),
    }
}

#[tokio::test]
async fn fake_records_notices_and_webhooks() {
    let notifier = FakeNotifier::new();
    notifier.notify(&notice(NoticeKind::Done)).await.unwrap();
    notifier
        .webhook("http://example.test/hook", &serde_json::json!({"status": "done"}))
        .await
        .unwrap();
    notifier.error("worker", "boom").await;

    assert_eq!(notifier.notices(), vec![NoticeKind::Done]);
    assert_eq!(notifier.webhook_urls(), vec!["http://example.test/hook"]);
    assert_eq!(notifier.errors(), vec![("worker".to_string(), "boom".to_string())]);
}

#[tokio::test]
async fn scripted_webhook_failures_are_transient() {
    let notifier = FakeNotifier::new();
    notifier.fail_next_webhooks(1);

    let err = notifier
        .webhook("http://example.test/hook", &serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, NotifyError::Unreachable(_)));

    notifier
        .webhook("http://example.test/hook", &serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(notifier.webhook_urls().len(), 1);
}

#[test]
fn rejection_is_permanent() {
    let err = NotifyError::Rejected { status: 410, body: "gone".to_string() };
    assert!(!err.is_transient());
}
