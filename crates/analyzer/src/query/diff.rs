// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layer diff: attribute-level comparison of two layers of one component.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indexer::extract_attributes;
use crate::remote::{DataService, RemoteComponent};
use crate::store::{ComponentRow, LayerAttributeRow, LayerRow, Store};

use super::QueryError;

/// Attribute names suppressed from diffs: bookkeeping columns the remote
/// service stamps on every layer.
const SUPPRESSED_ATTRIBUTES: &[&str] = &[
    "solutionid",
    "supportingsolutionid",
    "overwritetime",
    "componentstate",
    "versionnumber",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRequest {
    pub component_id: String,
    pub left_solution: String,
    pub right_solution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDiff {
    pub name: String,
    pub left_value: Option<String>,
    pub right_value: Option<String>,
    pub type_tag: String,
    pub is_complex: bool,
    pub only_in_left: bool,
    pub only_in_right: bool,
    pub is_different: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    pub attributes: Vec<AttributeDiff>,
    pub warnings: Vec<String>,
}

/// Diff evaluator over one store, with lazy payload fetch through the
/// remote service.
pub struct DiffEngine {
    store: Arc<Store>,
    remote: Arc<dyn DataService>,
}

impl DiffEngine {
    pub fn new(store: Arc<Store>, remote: Arc<dyn DataService>) -> Self {
        Self { store, remote }
    }

    pub async fn diff(&self, request: &DiffRequest) -> Result<DiffResponse, QueryError> {
        let component = self
            .store
            .component(&request.component_id)?
            .ok_or_else(|| QueryError::ComponentNotFound(request.component_id.clone()))?;
        let layers = self.store.layers_of(&request.component_id)?;

        let mut warnings = Vec::new();
        let left = self
            .side(&component, &layers, &request.left_solution, &mut warnings)
            .await?;
        let right = self
            .side(&component, &layers, &request.right_solution, &mut warnings)
            .await?;

        if let Some((_, attributes)) = &right {
            if !attributes.iter().any(|a| a.is_changed) {
                warnings.push(format!(
                    "no changed attributes recorded on layer '{}'",
                    request.right_solution
                ));
            }
        }

        let attributes = merge_sides(left, right);
        Ok(DiffResponse { attributes, warnings })
    }

    /// Locate one side's layer and its attribute rows, fetching a deferred
    /// payload on demand.
    async fn side(
        &self,
        component: &ComponentRow,
        layers: &[LayerRow],
        solution: &str,
        warnings: &mut Vec<String>,
    ) -> Result<Option<(LayerRow, Vec<LayerAttributeRow>)>, QueryError> {
        let Some(layer) = layers.iter().find(|l| l.solution_name.eq_ignore_ascii_case(solution))
        else {
            warnings.push(format!("no layer for solution '{solution}'"));
            return Ok(None);
        };

        let mut attributes = self.store.attributes_of(&layer.layer_id)?;
        if attributes.is_empty() {
            if let Some(json) = self.payload_for(component, layer).await? {
                attributes = extract_attributes(&json, &HashSet::new());
                self.store.replace_attributes(&layer.layer_id, &attributes)?;
            }
        }
        Ok(Some((layer.clone(), attributes)))
    }

    /// The stored payload, or a lazy fetch persisted for next time.
    async fn payload_for(
        &self,
        component: &ComponentRow,
        layer: &LayerRow,
    ) -> Result<Option<String>, QueryError> {
        if let Some(json) = &layer.component_json {
            return Ok(Some(json.clone()));
        }
        debug!(layer = %layer.layer_id, "fetching deferred layer payload");
        let remote_component = RemoteComponent {
            component_id: component.component_id.clone(),
            component_type: component.component_type.clone(),
            type_code: component.type_code,
            object_id: component.object_id.clone(),
            logical_name: component.logical_name.clone(),
            display_name: component.display_name.clone(),
            entity_scoped: false,
        };
        let fetched = self
            .remote
            .component_payload(&remote_component, &layer.solution_name)
            .await
            .map_err(|e| QueryError::Invalid(e.to_string()))?;
        if let Some(json) = &fetched {
            self.store.set_layer_payload(&layer.layer_id, json)?;
        }
        Ok(fetched)
    }
}

type Side = Option<(LayerRow, Vec<LayerAttributeRow>)>;

fn merge_sides(left: Side, right: Side) -> Vec<AttributeDiff> {
    let left_map = side_map(&left);
    let right_map = side_map(&right);

    let mut names: Vec<&String> = left_map.keys().chain(right_map.keys()).collect();
    names.sort();
    names.dedup();

    names
        .into_iter()
        .filter(|name| !is_suppressed(name))
        .map(|name| {
            let l = left_map.get(name);
            let r = right_map.get(name);
            let reference = l.or(r);
            AttributeDiff {
                name: name.clone(),
                left_value: l.map(|a| a.formatted_value.clone()),
                right_value: r.map(|a| a.formatted_value.clone()),
                type_tag: reference.map(|a| a.type_tag.clone()).unwrap_or_default(),
                is_complex: reference.map(|a| a.is_complex).unwrap_or(false),
                only_in_left: l.is_some() && r.is_none(),
                only_in_right: r.is_some() && l.is_none(),
                is_different: match (l, r) {
                    (Some(l), Some(r)) => l.raw_value != r.raw_value,
                    _ => true,
                },
            }
        })
        .collect()
}

fn side_map(side: &Side) -> BTreeMap<String, &LayerAttributeRow> {
    side.as_ref()
        .map(|(_, attributes)| {
            attributes.iter().map(|a| (a.name.clone(), a)).collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default()
}

fn is_suppressed(name: &str) -> bool {
    SUPPRESSED_ATTRIBUTES.iter().any(|s| s.eq_ignore_ascii_case(name))
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
