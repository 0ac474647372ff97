// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query engine: filter AST over the indexed store.
//!
//! Execution order: pushdown fragment as indexed SQL, residual fragment in
//! memory over prefetched layer stacks, then sort, group, and page. Plan
//! stats make the split observable.

pub mod ast;
pub mod diff;
mod eval;
mod plan;

pub use ast::{AttributeField, Filter, LayerFilter, SolutionMatcher, StringOp};
pub use diff::{AttributeDiff, DiffEngine, DiffRequest, DiffResponse};
pub use eval::{ComponentView, SolutionCatalog};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use ddk_core::QueryId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{LayerRow, Store, StoreError};

pub const DEFAULT_TAKE: u64 = 500;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub query_id: QueryId,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_take")]
    pub take: u64,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default)]
    pub use_event_response: bool,
    #[serde(default)]
    pub include_stats: bool,
}

fn default_take() -> u64 {
    DEFAULT_TAKE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlanStats {
    pub pre_fetch_duration_ms: u64,
    pub sql_query_duration_ms: u64,
    pub in_memory_filter_duration_ms: u64,
    pub total_duration_ms: u64,
    pub rows_from_sql: u64,
    pub rows_after_filter: u64,
    /// `rowsAfterFilter / rowsFromSql`; 1.0 when nothing was filtered.
    pub filter_efficiency: f64,
    pub used_in_memory_filter: bool,
    pub plan_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query_id: QueryId,
    pub rows: Vec<serde_json::Value>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueryPlanStats>,
}

/// Synchronous query evaluation over one store.
pub struct QueryEngine {
    store: Arc<Store>,
}

impl QueryEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn run(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        if let Some(filter) = &request.filter {
            filter.validate().map_err(|e| QueryError::Invalid(e.to_string()))?;
        }
        let total_started = Instant::now();

        // Pushdown phase
        let split = plan::split(request.filter.as_ref());
        let sql_started = Instant::now();
        let components = match &split.pushdown {
            Some(pushdown) => {
                self.store.components_where(&pushdown.where_sql, &pushdown.params)?
            }
            None => self.store.components_where("", &[])?,
        };
        let sql_duration = sql_started.elapsed();
        let rows_from_sql = components.len() as u64;

        // Prefetch layer stacks and the solution catalog for residual
        // evaluation and row projection.
        let prefetch_started = Instant::now();
        let ids: Vec<String> = components.iter().map(|c| c.component_id.clone()).collect();
        let layers = self.store.layers_for_components(&ids)?;
        let catalog: SolutionCatalog = self
            .store
            .solutions()?
            .into_iter()
            .map(|s| (s.unique_name.clone(), s))
            .collect();
        let mut stacks: BTreeMap<String, Vec<LayerRow>> = BTreeMap::new();
        for layer in layers {
            stacks.entry(layer.component_id.clone()).or_default().push(layer);
        }
        let views: Vec<ComponentView> = components
            .into_iter()
            .map(|component| {
                let layers = stacks.remove(&component.component_id).unwrap_or_default();
                ComponentView { component, layers }
            })
            .collect();
        let prefetch_duration = prefetch_started.elapsed();

        // Residual phase
        let filter_started = Instant::now();
        let used_in_memory_filter = split.residual.is_some();
        let filtered: Vec<ComponentView> = match &split.residual {
            Some(residual) => views
                .into_iter()
                .filter(|view| eval::matches(residual, view, &catalog))
                .collect(),
            None => views,
        };
        let filter_duration = filter_started.elapsed();
        let rows_after_filter = filtered.len() as u64;

        // Projection, grouping, sorting, paging
        let mut rows: Vec<serde_json::Value> = filtered.iter().map(project).collect();
        if !request.group_by.is_empty() {
            rows = group_rows(rows, &request.group_by);
        }
        sort_rows(&mut rows, &request.sort);
        let total = rows.len() as u64;
        let rows: Vec<serde_json::Value> = if request.take == 0 {
            Vec::new()
        } else {
            rows.into_iter().skip(request.skip as usize).take(request.take as usize).collect()
        };
        let rows = if request.select.is_empty() {
            rows
        } else {
            rows.into_iter().map(|row| select_fields(row, &request.select)).collect()
        };

        let stats = request.include_stats.then(|| QueryPlanStats {
            pre_fetch_duration_ms: prefetch_duration.as_millis() as u64,
            sql_query_duration_ms: sql_duration.as_millis() as u64,
            in_memory_filter_duration_ms: filter_duration.as_millis() as u64,
            total_duration_ms: total_started.elapsed().as_millis() as u64,
            rows_from_sql,
            rows_after_filter,
            filter_efficiency: if rows_from_sql == 0 {
                1.0
            } else {
                rows_after_filter as f64 / rows_from_sql as f64
            },
            used_in_memory_filter,
            plan_description: split.description.clone(),
        });

        Ok(QueryResponse { query_id: request.query_id.clone(), rows, total, stats })
    }
}

/// Project one component view into a result row.
fn project(view: &ComponentView) -> serde_json::Value {
    let solutions: Vec<&str> = view.layers.iter().map(|l| l.solution_name.as_str()).collect();
    serde_json::json!({
        "componentId": view.component.component_id,
        "componentType": view.component.component_type,
        "typeCode": view.component.type_code,
        "objectId": view.component.object_id,
        "logicalName": view.component.logical_name,
        "displayName": view.component.display_name,
        "tableLogicalName": view.component.table_logical_name,
        "isManaged": view.is_managed(),
        "publisher": view.publisher(),
        "layerCount": view.layers.len(),
        "solutions": solutions,
    })
}

/// Collapse rows into one row per distinct `group_by` key, with a count.
fn group_rows(rows: Vec<serde_json::Value>, group_by: &[String]) -> Vec<serde_json::Value> {
    let mut groups: BTreeMap<Vec<String>, u64> = BTreeMap::new();
    for row in &rows {
        let key: Vec<String> = group_by
            .iter()
            .map(|field| row.get(field).map(value_key).unwrap_or_default())
            .collect();
        *groups.entry(key).or_default() += 1;
    }
    groups
        .into_iter()
        .map(|(key, count)| {
            let mut object = serde_json::Map::new();
            for (field, value) in group_by.iter().zip(key) {
                object.insert(field.clone(), serde_json::Value::String(value));
            }
            object.insert("count".to_string(), serde_json::Value::from(count));
            serde_json::Value::Object(object)
        })
        .collect()
}

fn value_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sort_rows(rows: &mut [serde_json::Value], sort: &[SortSpec]) {
    if sort.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for spec in sort {
            let ordering = compare_values(a.get(&spec.field), b.get(&spec.field));
            let ordering = if spec.descending { ordering.reverse() } else { ordering };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> std::cmp::Ordering {
    use serde_json::Value;
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(x), Some(y)) => value_key(x).cmp(&value_key(y)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

fn select_fields(row: serde_json::Value, select: &[String]) -> serde_json::Value {
    let serde_json::Value::Object(object) = row else {
        return row;
    };
    let narrowed: serde_json::Map<String, serde_json::Value> = object
        .into_iter()
        .filter(|(key, _)| select.iter().any(|s| s == key) || key == "componentId")
        .collect();
    serde_json::Value::Object(narrowed)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
