// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for inline ID buffers and generated ID types.

use crate::execution::ExecutionId;
use crate::id::{short, IdBuf, ID_MAX_LEN};
use crate::job::JobId;

#[test]
fn generated_ids_have_prefix_and_fixed_length() {
    let id = JobId::new();
    assert!(id.as_str().starts_with("job-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);

    let id = ExecutionId::new();
    assert!(id.as_str().starts_with("exe-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn generated_ids_are_unique() {
    let a = JobId::new();
    let b = JobId::new();
    assert_ne!(a, b);
}

#[test]
fn ids_generated_later_sort_later() {
    // ULIDs embed a millisecond timestamp in the high bits; two IDs minted
    // across a timestamp boundary must sort in generation order.
    let a = JobId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = JobId::new();
    assert!(a < b, "{} should sort before {}", a, b);
}

#[test]
fn suffix_strips_prefix() {
    let id = JobId::from_string("job-01hq3ka9z6x8w2n5p7r4s1t0vb");
    assert_eq!(id.suffix(), "01hq3ka9z6x8w2n5p7r4s1t0vb");
    assert_eq!(id.short(8), "01hq3ka9");
}

#[test]
fn from_string_roundtrips_through_serde() {
    let id = JobId::from_string("job-abc");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"job-abc\"");
    let back: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn idbuf_rejects_oversized_input_on_deserialize() {
    let long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    let result: Result<IdBuf, _> = serde_json::from_str(&long);
    assert!(result.is_err());
}

#[test]
fn idbuf_borrow_matches_str_hash() {
    use std::collections::HashMap;
    let mut map: HashMap<JobId, u32> = HashMap::new();
    let id = JobId::from_string("job-lookup");
    map.insert(id, 7);
    assert_eq!(map.get("job-lookup"), Some(&7));
}

#[test]
fn short_truncates() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
}
