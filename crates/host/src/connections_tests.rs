// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ddk_core::Connection;
use tempfile::tempdir;

use super::*;

#[test]
fn upsert_then_get_roundtrips() {
    let temp = tempdir().unwrap();
    let store = ConnectionStore::open(&temp.path().join("connections.json")).unwrap();

    store.upsert(Connection::new("c1", "Dev", "https://dev.example.test")).unwrap();
    let loaded = store.get(&"c1".into()).unwrap();
    assert_eq!(loaded.name, "Dev");
    assert!(!loaded.active);
}

#[test]
fn connections_survive_reopen() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("connections.json");

    {
        let store = ConnectionStore::open(&path).unwrap();
        store.upsert(Connection::new("c1", "Dev", "https://dev.example.test")).unwrap();
        store.upsert(Connection::new("c2", "Prod", "https://prod.example.test")).unwrap();
    }

    let reopened = ConnectionStore::open(&path).unwrap();
    assert_eq!(reopened.list().len(), 2);
    assert_eq!(reopened.get(&"c2".into()).unwrap().url, "https://prod.example.test");
}

#[test]
fn set_active_is_exclusive() {
    let temp = tempdir().unwrap();
    let store = ConnectionStore::open(&temp.path().join("connections.json")).unwrap();
    store.upsert(Connection::new("c1", "Dev", "https://dev.example.test")).unwrap();
    store.upsert(Connection::new("c2", "Prod", "https://prod.example.test")).unwrap();

    store.set_active(&"c1".into()).unwrap();
    store.set_active(&"c2".into()).unwrap();

    let active: Vec<_> = store.list().into_iter().filter(|c| c.active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id.as_str(), "c2");
}

#[test]
fn remove_is_explicit_and_final() {
    let temp = tempdir().unwrap();
    let store = ConnectionStore::open(&temp.path().join("connections.json")).unwrap();
    store.upsert(Connection::new("c1", "Dev", "https://dev.example.test")).unwrap();

    store.remove(&"c1".into()).unwrap();
    assert!(store.get(&"c1".into()).is_none());
    assert!(matches!(store.remove(&"c1".into()), Err(ConnectionStoreError::Unknown(_))));
}

#[test]
fn auth_fields_are_not_persisted() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("connections.json");
    let store = ConnectionStore::open(&path).unwrap();
    store.upsert(Connection::new("c1", "Dev", "https://dev.example.test")).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("is_authenticated"));
    assert!(!raw.contains("principal"));
}
