// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::task::{validate_task_id, Task, TaskError};

#[test]
fn accepts_reasonable_ids() {
    for id in ["send-emails", "etl_nightly", "v2.reindex", "ABC-123"] {
        assert!(validate_task_id(id).is_ok(), "{}", id);
    }
}

#[test]
fn rejects_empty_and_exotic_ids() {
    assert!(matches!(validate_task_id(""), Err(TaskError::EmptyId)));
    for id in ["a/b", "a b", "tásk", "a:b"] {
        assert!(matches!(validate_task_id(id), Err(TaskError::InvalidId(_))), "{}", id);
    }
}

#[test]
fn new_task_stamps_timestamps() {
    let task = Task::new("reports", 1_234).unwrap();
    assert_eq!(task.created_at_ms, 1_234);
    assert_eq!(task.last_modified_at_ms, 1_234);
}
