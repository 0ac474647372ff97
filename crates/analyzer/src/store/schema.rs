// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded store schema and migration.
//!
//! One SQLite file per connection. `user_version` tracks the schema
//! revision; migrations run inside one transaction on open.

use rusqlite::Connection;

use super::StoreError;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS solution (
    solution_id       TEXT PRIMARY KEY,
    unique_name       TEXT NOT NULL,
    friendly_name     TEXT NOT NULL DEFAULT '',
    publisher         TEXT NOT NULL DEFAULT '',
    is_managed        INTEGER NOT NULL DEFAULT 0,
    version           TEXT NOT NULL DEFAULT '',
    is_source         INTEGER NOT NULL DEFAULT 0,
    is_target         INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_solution_unique_name ON solution(unique_name);

CREATE TABLE IF NOT EXISTS component (
    component_id        TEXT PRIMARY KEY,
    component_type      TEXT NOT NULL,
    type_code           INTEGER NOT NULL DEFAULT 0,
    object_id           TEXT NOT NULL UNIQUE,
    logical_name        TEXT NOT NULL DEFAULT '',
    display_name        TEXT NOT NULL DEFAULT '',
    table_logical_name  TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_component_type ON component(component_type);

CREATE TABLE IF NOT EXISTS layer (
    layer_id       TEXT PRIMARY KEY,
    component_id   TEXT NOT NULL REFERENCES component(component_id) ON DELETE CASCADE,
    ordinal        INTEGER NOT NULL,
    solution_id    TEXT NOT NULL DEFAULT '',
    solution_name  TEXT NOT NULL DEFAULT '',
    publisher      TEXT NOT NULL DEFAULT '',
    is_managed     INTEGER NOT NULL DEFAULT 0,
    version        TEXT NOT NULL DEFAULT '',
    created_on     TEXT NOT NULL DEFAULT '',
    component_json TEXT,
    UNIQUE(component_id, ordinal)
);
CREATE INDEX IF NOT EXISTS idx_layer_component ON layer(component_id, ordinal);

CREATE TABLE IF NOT EXISTS layer_attribute (
    attribute_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    layer_id        TEXT NOT NULL REFERENCES layer(layer_id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    formatted_value TEXT NOT NULL DEFAULT '',
    raw_value       TEXT NOT NULL DEFAULT '',
    type_tag        TEXT NOT NULL DEFAULT '',
    is_complex      INTEGER NOT NULL DEFAULT 0,
    is_changed      INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_attribute_layer ON layer_attribute(layer_id);

CREATE TABLE IF NOT EXISTS artifact (
    artifact_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    component_id TEXT NOT NULL,
    solution_id  TEXT NOT NULL,
    payload_type TEXT NOT NULL,
    payload_text TEXT NOT NULL,
    cached_on    TEXT NOT NULL,
    UNIQUE(component_id, solution_id, payload_type)
);

CREATE TABLE IF NOT EXISTS index_operation (
    operation_id  TEXT PRIMARY KEY,
    status        TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    completed_at  TEXT,
    stats_json    TEXT,
    warnings_json TEXT NOT NULL DEFAULT '[]',
    error         TEXT
);

CREATE TABLE IF NOT EXISTS index_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Create or upgrade the schema.
pub(super) fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    if version < 1 {
        tx.execute_batch(SCHEMA_V1)?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}
