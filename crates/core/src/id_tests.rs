// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fresh_ids_are_unique() {
    let a = InstanceId::fresh();
    let b = InstanceId::fresh();
    assert_ne!(a, b);
    assert!(!a.is_empty());
}

#[test]
fn ids_serialize_as_bare_strings() {
    let id = ConnectionId::new("conn-1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"conn-1\"");

    let back: ConnectionId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn empty_connection_id_is_detectable() {
    let id = ConnectionId::new("");
    assert!(id.is_empty());
}

#[test]
fn worker_key_display_joins_plugin_and_instance() {
    let key = WorkerKey::new("sla", "tab-1");
    assert_eq!(key.to_string(), "sla/tab-1");
}

#[test]
fn worker_key_roundtrips_through_json() {
    let key = WorkerKey::new("sla", "tab-1");
    let json = serde_json::to_string(&key).unwrap();
    let back: WorkerKey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, key);
}
