// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row types for the embedded store.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionRow {
    pub solution_id: String,
    pub unique_name: String,
    pub friendly_name: String,
    pub publisher: String,
    pub is_managed: bool,
    pub version: String,
    pub is_source: bool,
    pub is_target: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRow {
    pub component_id: String,
    pub component_type: String,
    pub type_code: i64,
    pub object_id: String,
    pub logical_name: String,
    pub display_name: String,
    pub table_logical_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRow {
    pub layer_id: String,
    pub component_id: String,
    /// 0 = base; dense within a component.
    pub ordinal: i64,
    pub solution_id: String,
    pub solution_name: String,
    pub publisher: String,
    pub is_managed: bool,
    pub version: String,
    pub created_on: String,
    pub component_json: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAttributeRow {
    pub name: String,
    pub formatted_value: String,
    pub raw_value: String,
    pub type_tag: String,
    pub is_complex: bool,
    /// True iff the source system's change record enumerates this attribute
    /// for the layer. Surfaced as received.
    pub is_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRow {
    pub component_id: String,
    pub solution_id: String,
    pub payload_type: String,
    pub payload_text: String,
    pub cached_on: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    InProgress,
    Completed,
    Failed,
}

ddk_core::simple_display! {
    OperationStatus {
        InProgress => "InProgress",
        Completed => "Completed",
        Failed => "Failed",
    }
}

impl OperationStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "InProgress" => Some(Self::InProgress),
            "Completed" => Some(Self::Completed),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Aggregated counters reported on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub solutions: u64,
    pub components: u64,
    pub layers: u64,
    pub attributes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOperationRow {
    pub operation_id: String,
    pub status: OperationStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub stats: Option<IndexStats>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}
