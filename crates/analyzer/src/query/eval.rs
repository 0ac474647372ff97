// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory evaluation of residual filter fragments.

use std::collections::HashMap;

use crate::store::{ComponentRow, LayerRow, SolutionRow};

use super::ast::{
    AttributeField, Filter, LayerField, LayerFilter, SolutionField, SolutionMatcher,
};

/// One component with its layer stack, as loaded for residual evaluation.
#[derive(Debug, Clone)]
pub struct ComponentView {
    pub component: ComponentRow,
    /// Ordered base → top.
    pub layers: Vec<LayerRow>,
}

impl ComponentView {
    pub fn top_layer(&self) -> Option<&LayerRow> {
        self.layers.last()
    }

    pub fn publisher(&self) -> &str {
        self.top_layer().map(|l| l.publisher.as_str()).unwrap_or_default()
    }

    pub fn is_managed(&self) -> bool {
        self.top_layer().map(|l| l.is_managed).unwrap_or(false)
    }
}

/// Solutions by unique name, for matchers that reach solution attributes
/// the layer rows don't carry.
pub type SolutionCatalog = HashMap<String, SolutionRow>;

/// Evaluate a filter against one component view.
pub fn matches(filter: &Filter, view: &ComponentView, catalog: &SolutionCatalog) -> bool {
    match filter {
        Filter::And { children } => children.iter().all(|c| matches(c, view, catalog)),
        Filter::Or { children } => children.iter().any(|c| matches(c, view, catalog)),
        Filter::Not { child } => !matches(child, view, catalog),

        Filter::Attribute { field, op, value } => {
            let actual = match field {
                AttributeField::LogicalName => view.component.logical_name.as_str(),
                AttributeField::DisplayName => view.component.display_name.as_str(),
                AttributeField::ComponentType => view.component.component_type.as_str(),
                AttributeField::TableLogicalName => view.component.table_logical_name.as_str(),
                AttributeField::Publisher => view.publisher(),
            };
            op.matches(actual, value)
        }

        Filter::Managed { value } => view.is_managed() == *value,

        Filter::Has { solution } => {
            view.layers.iter().any(|layer| matcher_matches(solution, layer, catalog))
        }
        Filter::HasAny { solutions } => view
            .layers
            .iter()
            .any(|layer| solutions.iter().any(|m| matcher_matches(m, layer, catalog))),
        Filter::HasAll { solutions } => solutions
            .iter()
            .all(|m| view.layers.iter().any(|layer| matcher_matches(m, layer, catalog))),
        Filter::HasNone { solutions } => !view
            .layers
            .iter()
            .any(|layer| solutions.iter().any(|m| matcher_matches(m, layer, catalog))),

        Filter::OrderStrict { sequence } => order_strict(sequence, view, catalog),
        Filter::OrderFlex { sequence } => sequence.iter().all(|group| {
            view.layers
                .iter()
                .any(|layer| group.iter().any(|m| matcher_matches(m, layer, catalog)))
        }),

        Filter::LayerQuery { filter } => {
            view.layers.iter().any(|layer| layer_matches(filter, layer))
        }

        Filter::SolutionQuery { field, op, value } => view.layers.iter().any(|layer| {
            let matcher =
                SolutionMatcher::Query { field: *field, op: *op, value: value.clone() };
            matcher_matches(&matcher, layer, catalog)
        }),
    }
}

/// Ordered subsequence match: each pattern group must be satisfied by a
/// layer strictly above the previous group's match.
fn order_strict(
    sequence: &[Vec<SolutionMatcher>],
    view: &ComponentView,
    catalog: &SolutionCatalog,
) -> bool {
    let mut next_layer = 0usize;
    for group in sequence {
        let found = view.layers[next_layer..]
            .iter()
            .position(|layer| group.iter().any(|m| matcher_matches(m, layer, catalog)));
        match found {
            Some(offset) => next_layer += offset + 1,
            None => return false,
        }
    }
    true
}

fn matcher_matches(matcher: &SolutionMatcher, layer: &LayerRow, catalog: &SolutionCatalog) -> bool {
    match matcher {
        SolutionMatcher::Name(name) => layer.solution_name.eq_ignore_ascii_case(name),
        SolutionMatcher::Query { field, op, value } => {
            let actual = match field {
                SolutionField::UniqueName => layer.solution_name.clone(),
                SolutionField::Publisher => layer.publisher.clone(),
                SolutionField::Version => layer.version.clone(),
                SolutionField::FriendlyName => catalog
                    .get(&layer.solution_name)
                    .map(|s| s.friendly_name.clone())
                    .unwrap_or_default(),
            };
            op.matches(&actual, value)
        }
    }
}

fn layer_matches(filter: &LayerFilter, layer: &LayerRow) -> bool {
    match filter {
        LayerFilter::And { children } => children.iter().all(|c| layer_matches(c, layer)),
        LayerFilter::Or { children } => children.iter().any(|c| layer_matches(c, layer)),
        LayerFilter::Not { child } => !layer_matches(child, layer),
        LayerFilter::Managed { value } => layer.is_managed == *value,
        LayerFilter::Field { field, op, value } => {
            let actual = match field {
                LayerField::SolutionName => layer.solution_name.as_str(),
                LayerField::Publisher => layer.publisher.as_str(),
                LayerField::Version => layer.version.as_str(),
                LayerField::CreatedOn => layer.created_on.as_str(),
            };
            op.matches(actual, value)
        }
    }
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod tests;
