// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query planning: split a filter into a pushdown fragment (indexed SQL
//! over component/layer columns) and a residual fragment (evaluated in
//! memory over the pushdown result).
//!
//! The split is all-or-nothing per subtree, except at a top-level AND,
//! which partitions its children. The decision is observable through
//! `planDescription`.

use rusqlite::types::Value;

use super::ast::{AttributeField, Filter, SolutionMatcher, StringOp};

/// Compiled pushdown predicate.
#[derive(Debug, Default)]
pub struct Pushdown {
    pub where_sql: String,
    pub params: Vec<Value>,
}

/// Result of splitting a filter.
#[derive(Debug)]
pub struct SplitPlan {
    pub pushdown: Option<Pushdown>,
    pub residual: Option<Filter>,
    pub description: String,
}

/// Split `filter` into pushdown + residual fragments.
pub fn split(filter: Option<&Filter>) -> SplitPlan {
    let Some(filter) = filter else {
        return SplitPlan { pushdown: None, residual: None, description: "full scan".to_string() };
    };

    match filter {
        Filter::And { children } => {
            let mut compiled = Vec::new();
            let mut residual_children = Vec::new();
            for child in children {
                match try_compile(child) {
                    Some(fragment) => compiled.push(fragment),
                    None => residual_children.push(child.clone()),
                }
            }
            let pushdown = merge_and(compiled);
            let residual = match residual_children.len() {
                0 => None,
                1 => Some(residual_children.remove(0)),
                _ => Some(Filter::And { children: residual_children }),
            };
            describe(pushdown, residual)
        }
        other => match try_compile(other) {
            Some(fragment) => describe(Some(fragment), None),
            None => describe(None, Some(other.clone())),
        },
    }
}

fn describe(pushdown: Option<Pushdown>, residual: Option<Filter>) -> SplitPlan {
    let description = match (&pushdown, &residual) {
        (None, None) => "full scan".to_string(),
        (Some(p), None) => format!("pushdown: {}", p.where_sql),
        (None, Some(r)) => format!("full scan; in-memory: {}", summarize(r)),
        (Some(p), Some(r)) => {
            format!("pushdown: {}; in-memory: {}", p.where_sql, summarize(r))
        }
    };
    SplitPlan { pushdown, residual, description }
}

/// Short tag list for the plan description.
fn summarize(filter: &Filter) -> String {
    match filter {
        Filter::And { children } => {
            children.iter().map(summarize).collect::<Vec<_>>().join(" AND ")
        }
        Filter::Or { .. } => "OR(..)".to_string(),
        Filter::Not { .. } => "NOT(..)".to_string(),
        Filter::Attribute { field, .. } => format!("ATTRIBUTE({field:?})"),
        Filter::Managed { .. } => "MANAGED".to_string(),
        Filter::Has { .. } => "HAS".to_string(),
        Filter::HasAny { .. } => "HAS_ANY".to_string(),
        Filter::HasAll { .. } => "HAS_ALL".to_string(),
        Filter::HasNone { .. } => "HAS_NONE".to_string(),
        Filter::OrderStrict { .. } => "ORDER_STRICT".to_string(),
        Filter::OrderFlex { .. } => "ORDER_FLEX".to_string(),
        Filter::LayerQuery { .. } => "LAYER_QUERY".to_string(),
        Filter::SolutionQuery { .. } => "SOLUTION_QUERY".to_string(),
    }
}

fn merge_and(fragments: Vec<Pushdown>) -> Option<Pushdown> {
    if fragments.is_empty() {
        return None;
    }
    let mut where_sql = Vec::new();
    let mut params = Vec::new();
    for fragment in fragments {
        where_sql.push(format!("({})", fragment.where_sql));
        params.extend(fragment.params);
    }
    Some(Pushdown { where_sql: where_sql.join(" AND "), params })
}

/// Compile a fully pushable subtree, or `None` when any part needs
/// per-row logic.
fn try_compile(filter: &Filter) -> Option<Pushdown> {
    match filter {
        Filter::Attribute { field, op, value } => {
            let column = attribute_column(*field)?;
            Some(compile_string_op(column, *op, value))
        }

        Filter::Has { solution } => compile_has_any(std::slice::from_ref(solution)),
        Filter::HasAny { solutions } => compile_has_any(solutions),
        Filter::HasAll { solutions } => {
            let fragments = solutions
                .iter()
                .map(|matcher| compile_has_any(std::slice::from_ref(matcher)))
                .collect::<Option<Vec<_>>>()?;
            merge_and(fragments)
        }
        Filter::HasNone { solutions } => {
            let inner = compile_has_any(solutions)?;
            Some(Pushdown { where_sql: format!("NOT ({})", inner.where_sql), params: inner.params })
        }

        Filter::And { children } => {
            let fragments =
                children.iter().map(try_compile).collect::<Option<Vec<_>>>()?;
            merge_and(fragments)
        }
        Filter::Or { children } => {
            let fragments =
                children.iter().map(try_compile).collect::<Option<Vec<_>>>()?;
            let mut where_sql = Vec::new();
            let mut params = Vec::new();
            for fragment in fragments {
                where_sql.push(format!("({})", fragment.where_sql));
                params.extend(fragment.params);
            }
            Some(Pushdown { where_sql: where_sql.join(" OR "), params })
        }
        Filter::Not { child } => {
            let inner = try_compile(child)?;
            Some(Pushdown { where_sql: format!("NOT ({})", inner.where_sql), params: inner.params })
        }

        // Per-row logic: top-layer state, layer order, nested layer
        // filters, and solution-attribute matchers.
        Filter::Managed { .. }
        | Filter::OrderStrict { .. }
        | Filter::OrderFlex { .. }
        | Filter::LayerQuery { .. }
        | Filter::SolutionQuery { .. } => None,
    }
}

/// HAS over plain names becomes an EXISTS over the layer index; any
/// solution-attribute matcher forces the whole node into memory.
fn compile_has_any(matchers: &[SolutionMatcher]) -> Option<Pushdown> {
    let mut names = Vec::with_capacity(matchers.len());
    for matcher in matchers {
        match matcher {
            SolutionMatcher::Name(name) => names.push(name.clone()),
            SolutionMatcher::Query { .. } => return None,
        }
    }
    let placeholders = names.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let where_sql = format!(
        "EXISTS (SELECT 1 FROM layer WHERE layer.component_id = component.component_id \
         AND layer.solution_name COLLATE NOCASE IN ({placeholders}))"
    );
    Some(Pushdown { where_sql, params: names.into_iter().map(Value::from).collect() })
}

fn attribute_column(field: AttributeField) -> Option<&'static str> {
    match field {
        AttributeField::LogicalName => Some("logical_name"),
        AttributeField::DisplayName => Some("display_name"),
        AttributeField::ComponentType => Some("component_type"),
        AttributeField::TableLogicalName => Some("table_logical_name"),
        // Publisher lives on the top layer; resolved in memory.
        AttributeField::Publisher => None,
    }
}

fn compile_string_op(column: &str, op: StringOp, value: &str) -> Pushdown {
    let (sql, param) = match op {
        StringOp::Equals => (format!("lower({column}) = lower(?)"), value.to_string()),
        StringOp::NotEquals => (format!("lower({column}) <> lower(?)"), value.to_string()),
        StringOp::Contains => {
            (format!("{column} LIKE '%' || ? || '%' ESCAPE '\\'"), escape_like(value))
        }
        StringOp::NotContains => {
            (format!("{column} NOT LIKE '%' || ? || '%' ESCAPE '\\'"), escape_like(value))
        }
        StringOp::BeginsWith => (format!("{column} LIKE ? || '%' ESCAPE '\\'"), escape_like(value)),
        StringOp::NotBeginsWith => {
            (format!("{column} NOT LIKE ? || '%' ESCAPE '\\'"), escape_like(value))
        }
        StringOp::EndsWith => (format!("{column} LIKE '%' || ? ESCAPE '\\'"), escape_like(value)),
        StringOp::NotEndsWith => {
            (format!("{column} NOT LIKE '%' || ? ESCAPE '\\'"), escape_like(value))
        }
    };
    Pushdown { where_sql: sql, params: vec![Value::from(param)] }
}

/// Escape LIKE wildcards in user input.
fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
