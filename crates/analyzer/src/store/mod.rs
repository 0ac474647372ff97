// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection embedded store.
//!
//! One SQLite file per connection under the plugin's storage directory.
//! A single connection guarded by an exclusive lock serializes all store
//! operations; mutation batches run in transactions.

mod rows;
mod schema;

pub use rows::{
    ArtifactRow, ComponentRow, IndexOperationRow, IndexStats, LayerAttributeRow, LayerRow,
    OperationStatus, SolutionRow,
};

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store is corrupt: {0}")]
    Corrupt(String),

    #[error("unknown index operation: {0}")]
    UnknownOperation(String),
}

/// The embedded relational store for one connection.
pub struct Store {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store for `connection_id` under `dir`.
    pub fn open(dir: &Path, connection_id: &str) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let file = format!("analyzer_{}.db", sanitize(connection_id));
        Self::open_at(&dir.join(file))
    }

    /// Open a store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let mut conn = Connection::open(path)?;
        schema::migrate(&mut conn)?;
        Ok(Self { path: path.to_path_buf(), conn: Mutex::new(conn) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate every table. Index metadata is cleared too.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for table in
            ["layer_attribute", "layer", "component", "solution", "artifact", "index_operation", "index_meta"]
        {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        tx.commit()?;
        Ok(())
    }

    // ----- solutions ------------------------------------------------------

    pub fn upsert_solution(&self, row: &SolutionRow) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO solution (solution_id, unique_name, friendly_name, publisher,
                                   is_managed, version, is_source, is_target)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(solution_id) DO UPDATE SET
                 unique_name = excluded.unique_name,
                 friendly_name = excluded.friendly_name,
                 publisher = excluded.publisher,
                 is_managed = excluded.is_managed,
                 version = excluded.version,
                 is_source = excluded.is_source,
                 is_target = excluded.is_target",
            params![
                row.solution_id,
                row.unique_name,
                row.friendly_name,
                row.publisher,
                row.is_managed,
                row.version,
                row.is_source,
                row.is_target,
            ],
        )?;
        Ok(())
    }

    pub fn solutions(&self) -> Result<Vec<SolutionRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT solution_id, unique_name, friendly_name, publisher, is_managed,
                    version, is_source, is_target
             FROM solution ORDER BY unique_name",
        )?;
        let rows = stmt
            .query_map([], solution_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn solution_by_unique_name(&self, name: &str) -> Result<Option<SolutionRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT solution_id, unique_name, friendly_name, publisher, is_managed,
                    version, is_source, is_target
             FROM solution WHERE unique_name = ?1",
        )?;
        Ok(stmt.query_row(params![name], solution_from_row).optional()?)
    }

    // ----- components -----------------------------------------------------

    /// Upsert a component, deduplicating on `object_id` across solutions.
    pub fn upsert_component(&self, row: &ComponentRow) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO component (component_id, component_type, type_code, object_id,
                                    logical_name, display_name, table_logical_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(component_id) DO UPDATE SET
                 component_type = excluded.component_type,
                 type_code = excluded.type_code,
                 logical_name = excluded.logical_name,
                 display_name = excluded.display_name,
                 table_logical_name = excluded.table_logical_name
             ON CONFLICT(object_id) DO UPDATE SET
                 component_type = excluded.component_type,
                 type_code = excluded.type_code,
                 logical_name = excluded.logical_name,
                 display_name = excluded.display_name,
                 table_logical_name = excluded.table_logical_name",
            params![
                row.component_id,
                row.component_type,
                row.type_code,
                row.object_id,
                row.logical_name,
                row.display_name,
                row.table_logical_name,
            ],
        )?;
        Ok(())
    }

    pub fn component(&self, component_id: &str) -> Result<Option<ComponentRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{COMPONENT_SELECT} WHERE component_id = ?1"))?;
        Ok(stmt.query_row(params![component_id], component_from_row).optional()?)
    }

    pub fn component_by_object(&self, object_id: &str) -> Result<Option<ComponentRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{COMPONENT_SELECT} WHERE object_id = ?1"))?;
        Ok(stmt.query_row(params![object_id], component_from_row).optional()?)
    }

    /// Components matching a prepared pushdown predicate.
    pub fn components_where(
        &self,
        where_sql: &str,
        params: &[rusqlite::types::Value],
    ) -> Result<Vec<ComponentRow>, StoreError> {
        let sql = if where_sql.is_empty() {
            format!("{COMPONENT_SELECT} ORDER BY component_id")
        } else {
            format!("{COMPONENT_SELECT} WHERE {where_sql} ORDER BY component_id")
        };
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), component_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ----- layers ---------------------------------------------------------

    /// Replace the full layer stack of a component. Ordinals are taken as
    /// given; callers assign them densely from 0.
    pub fn replace_layers(&self, component_id: &str, layers: &[LayerRow]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM layer WHERE component_id = ?1", params![component_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO layer (layer_id, component_id, ordinal, solution_id, solution_name,
                                    publisher, is_managed, version, created_on, component_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for layer in layers {
                stmt.execute(params![
                    layer.layer_id,
                    component_id,
                    layer.ordinal,
                    layer.solution_id,
                    layer.solution_name,
                    layer.publisher,
                    layer.is_managed,
                    layer.version,
                    layer.created_on,
                    layer.component_json,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn layers_of(&self, component_id: &str) -> Result<Vec<LayerRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{LAYER_SELECT} WHERE component_id = ?1 ORDER BY ordinal"))?;
        let rows = stmt
            .query_map(params![component_id], layer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Layer stacks for many components at once, ordered by ordinal.
    pub fn layers_for_components(
        &self,
        component_ids: &[String],
    ) -> Result<Vec<LayerRow>, StoreError> {
        let conn = self.conn.lock();
        let mut out = Vec::new();
        for chunk in component_ids.chunks(500) {
            let placeholders =
                (1..=chunk.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            let sql = format!(
                "{LAYER_SELECT} WHERE component_id IN ({placeholders}) ORDER BY component_id, ordinal"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), layer_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            out.extend(rows);
        }
        Ok(rows_sorted(out))
    }

    pub fn set_layer_payload(&self, layer_id: &str, component_json: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE layer SET component_json = ?2 WHERE layer_id = ?1",
            params![layer_id, component_json],
        )?;
        Ok(())
    }

    // ----- layer attributes ----------------------------------------------

    /// Replace the attribute rows of one layer.
    pub fn replace_attributes(
        &self,
        layer_id: &str,
        attributes: &[LayerAttributeRow],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM layer_attribute WHERE layer_id = ?1", params![layer_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO layer_attribute (layer_id, name, formatted_value, raw_value,
                                              type_tag, is_complex, is_changed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for attribute in attributes {
                stmt.execute(params![
                    layer_id,
                    attribute.name,
                    attribute.formatted_value,
                    attribute.raw_value,
                    attribute.type_tag,
                    attribute.is_complex,
                    attribute.is_changed,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn attributes_of(&self, layer_id: &str) -> Result<Vec<LayerAttributeRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, formatted_value, raw_value, type_tag, is_complex, is_changed
             FROM layer_attribute WHERE layer_id = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![layer_id], |row| {
                Ok(LayerAttributeRow {
                    name: row.get(0)?,
                    formatted_value: row.get(1)?,
                    raw_value: row.get(2)?,
                    type_tag: row.get(3)?,
                    is_complex: row.get(4)?,
                    is_changed: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ----- artifact cache -------------------------------------------------

    pub fn put_artifact(&self, row: &ArtifactRow) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO artifact (component_id, solution_id, payload_type, payload_text, cached_on)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(component_id, solution_id, payload_type) DO UPDATE SET
                 payload_text = excluded.payload_text,
                 cached_on = excluded.cached_on",
            params![row.component_id, row.solution_id, row.payload_type, row.payload_text, row.cached_on],
        )?;
        Ok(())
    }

    pub fn get_artifact(
        &self,
        component_id: &str,
        solution_id: &str,
        payload_type: &str,
    ) -> Result<Option<ArtifactRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT component_id, solution_id, payload_type, payload_text, cached_on
             FROM artifact WHERE component_id = ?1 AND solution_id = ?2 AND payload_type = ?3",
        )?;
        Ok(stmt
            .query_row(params![component_id, solution_id, payload_type], |row| {
                Ok(ArtifactRow {
                    component_id: row.get(0)?,
                    solution_id: row.get(1)?,
                    payload_type: row.get(2)?,
                    payload_text: row.get(3)?,
                    cached_on: row.get(4)?,
                })
            })
            .optional()?)
    }

    // ----- index operations ----------------------------------------------

    pub fn create_operation(&self, operation_id: &str, started_at: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO index_operation (operation_id, status, started_at)
             VALUES (?1, 'InProgress', ?2)",
            params![operation_id, started_at],
        )?;
        Ok(())
    }

    /// Transition `InProgress → Completed`. Terminal states are immutable;
    /// a second transition is a no-op.
    pub fn complete_operation(
        &self,
        operation_id: &str,
        completed_at: &str,
        stats: &IndexStats,
        warnings: &[String],
    ) -> Result<bool, StoreError> {
        let stats_json =
            serde_json::to_string(stats).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let warnings_json =
            serde_json::to_string(warnings).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let changed = self.conn.lock().execute(
            "UPDATE index_operation
             SET status = 'Completed', completed_at = ?2, stats_json = ?3, warnings_json = ?4
             WHERE operation_id = ?1 AND status = 'InProgress'",
            params![operation_id, completed_at, stats_json, warnings_json],
        )?;
        Ok(changed > 0)
    }

    /// Transition `InProgress → Failed`.
    pub fn fail_operation(
        &self,
        operation_id: &str,
        completed_at: &str,
        error: &str,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.lock().execute(
            "UPDATE index_operation
             SET status = 'Failed', completed_at = ?2, error = ?3
             WHERE operation_id = ?1 AND status = 'InProgress'",
            params![operation_id, completed_at, error],
        )?;
        Ok(changed > 0)
    }

    pub fn operation(&self, operation_id: &str) -> Result<IndexOperationRow, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT operation_id, status, started_at, completed_at, stats_json, warnings_json, error
             FROM index_operation WHERE operation_id = ?1",
        )?;
        stmt.query_row(params![operation_id], operation_from_row)
            .optional()?
            .ok_or_else(|| StoreError::UnknownOperation(operation_id.to_string()))
    }

    pub fn running_operation(&self) -> Result<Option<IndexOperationRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT operation_id, status, started_at, completed_at, stats_json, warnings_json, error
             FROM index_operation WHERE status = 'InProgress' LIMIT 1",
        )?;
        Ok(stmt.query_row([], operation_from_row).optional()?)
    }

    // ----- metadata -------------------------------------------------------

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row("SELECT value FROM index_meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Aggregated row counts.
    pub fn stats(&self) -> Result<IndexStats, StoreError> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<u64, rusqlite::Error> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n as u64)
        };
        Ok(IndexStats {
            solutions: count("SELECT COUNT(*) FROM solution")?,
            components: count("SELECT COUNT(*) FROM component")?,
            layers: count("SELECT COUNT(*) FROM layer")?,
            attributes: count("SELECT COUNT(*) FROM layer_attribute")?,
        })
    }
}

const COMPONENT_SELECT: &str = "SELECT component_id, component_type, type_code, object_id, \
                                logical_name, display_name, table_logical_name FROM component";
const LAYER_SELECT: &str = "SELECT layer_id, component_id, ordinal, solution_id, solution_name, \
                            publisher, is_managed, version, created_on, component_json FROM layer";

fn solution_from_row(row: &rusqlite::Row<'_>) -> Result<SolutionRow, rusqlite::Error> {
    Ok(SolutionRow {
        solution_id: row.get(0)?,
        unique_name: row.get(1)?,
        friendly_name: row.get(2)?,
        publisher: row.get(3)?,
        is_managed: row.get(4)?,
        version: row.get(5)?,
        is_source: row.get(6)?,
        is_target: row.get(7)?,
    })
}

fn component_from_row(row: &rusqlite::Row<'_>) -> Result<ComponentRow, rusqlite::Error> {
    Ok(ComponentRow {
        component_id: row.get(0)?,
        component_type: row.get(1)?,
        type_code: row.get(2)?,
        object_id: row.get(3)?,
        logical_name: row.get(4)?,
        display_name: row.get(5)?,
        table_logical_name: row.get(6)?,
    })
}

fn layer_from_row(row: &rusqlite::Row<'_>) -> Result<LayerRow, rusqlite::Error> {
    Ok(LayerRow {
        layer_id: row.get(0)?,
        component_id: row.get(1)?,
        ordinal: row.get(2)?,
        solution_id: row.get(3)?,
        solution_name: row.get(4)?,
        publisher: row.get(5)?,
        is_managed: row.get(6)?,
        version: row.get(7)?,
        created_on: row.get(8)?,
        component_json: row.get(9)?,
    })
}

fn operation_from_row(row: &rusqlite::Row<'_>) -> Result<IndexOperationRow, rusqlite::Error> {
    let status_text: String = row.get(1)?;
    let stats_json: Option<String> = row.get(4)?;
    let warnings_json: String = row.get(5)?;
    Ok(IndexOperationRow {
        operation_id: row.get(0)?,
        status: OperationStatus::parse(&status_text).unwrap_or(OperationStatus::Failed),
        started_at: row.get(2)?,
        completed_at: row.get(3)?,
        stats: stats_json.and_then(|s| serde_json::from_str(&s).ok()),
        warnings: serde_json::from_str(&warnings_json).unwrap_or_default(),
        error: row.get(6)?,
    })
}

fn rows_sorted(mut rows: Vec<LayerRow>) -> Vec<LayerRow> {
    rows.sort_by(|a, b| a.component_id.cmp(&b.component_id).then(a.ordinal.cmp(&b.ordinal)));
    rows
}

/// Connection ids become file names; anything exotic is flattened.
fn sanitize(connection_id: &str) -> String {
    connection_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
