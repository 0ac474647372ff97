// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filter AST.
//!
//! Wire shape is tag + payload; tags match the public query contract
//! (`AND`, `ATTRIBUTE`, `HAS_ANY`, ...). Solution references inside the
//! HAS-variants are either bare unique names or solution-attribute
//! constraints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AstError {
    #[error("empty {0} node")]
    EmptyComposite(&'static str),

    #[error("filter nesting exceeds {0} levels")]
    TooDeep(usize),
}

const MAX_DEPTH: usize = 32;

/// String comparison operators available to ATTRIBUTE and SOLUTION_QUERY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    BeginsWith,
    NotBeginsWith,
    EndsWith,
    NotEndsWith,
}

impl StringOp {
    /// Case-insensitive match, mirroring the remote service's collation.
    pub fn matches(self, actual: &str, expected: &str) -> bool {
        let actual = actual.to_lowercase();
        let expected = expected.to_lowercase();
        match self {
            Self::Equals => actual == expected,
            Self::NotEquals => actual != expected,
            Self::Contains => actual.contains(&expected),
            Self::NotContains => !actual.contains(&expected),
            Self::BeginsWith => actual.starts_with(&expected),
            Self::NotBeginsWith => !actual.starts_with(&expected),
            Self::EndsWith => actual.ends_with(&expected),
            Self::NotEndsWith => !actual.ends_with(&expected),
        }
    }
}

/// Component fields addressable by ATTRIBUTE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeField {
    LogicalName,
    DisplayName,
    ComponentType,
    /// Publisher of the component's top layer.
    Publisher,
    TableLogicalName,
}

/// Solution fields addressable by SOLUTION_QUERY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolutionField {
    UniqueName,
    FriendlyName,
    Publisher,
    Version,
}

/// A solution reference in a HAS-variant or ORDER pattern: a bare unique
/// name, or a constraint on solution attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SolutionMatcher {
    Name(String),
    Query { field: SolutionField, op: StringOp, value: String },
}

/// Layer fields addressable inside LAYER_QUERY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerField {
    SolutionName,
    Publisher,
    Version,
    CreatedOn,
}

/// Nested filter evaluated per layer by LAYER_QUERY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayerFilter {
    And { children: Vec<LayerFilter> },
    Or { children: Vec<LayerFilter> },
    Not { child: Box<LayerFilter> },
    Field { field: LayerField, op: StringOp, value: String },
    Managed { value: bool },
}

/// Component-level filter AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Filter {
    And { children: Vec<Filter> },
    Or { children: Vec<Filter> },
    Not { child: Box<Filter> },

    /// Compare one component field.
    Attribute { field: AttributeField, op: StringOp, value: String },

    /// Boolean match on the top layer's `isManaged`.
    Managed { value: bool },

    /// The component's layer-solution set contains the given solution.
    Has { solution: SolutionMatcher },
    HasAny { solutions: Vec<SolutionMatcher> },
    HasAll { solutions: Vec<SolutionMatcher> },
    HasNone { solutions: Vec<SolutionMatcher> },

    /// Layer sequence (base → top) contains layers matching each pattern
    /// group, in the given order.
    OrderStrict { sequence: Vec<Vec<SolutionMatcher>> },

    /// Every pattern group is matched by some layer, order irrelevant.
    OrderFlex { sequence: Vec<Vec<SolutionMatcher>> },

    /// Existential over the component's layers.
    LayerQuery { filter: Box<LayerFilter> },

    /// Bare solution constraint: the component has a layer from a matching
    /// solution. (The HAS-variants embed the same shape.)
    SolutionQuery { field: SolutionField, op: StringOp, value: String },
}

impl Filter {
    /// Reject malformed trees before planning.
    pub fn validate(&self) -> Result<(), AstError> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<(), AstError> {
        if depth > MAX_DEPTH {
            return Err(AstError::TooDeep(MAX_DEPTH));
        }
        match self {
            Self::And { children } => {
                if children.is_empty() {
                    return Err(AstError::EmptyComposite("AND"));
                }
                children.iter().try_for_each(|c| c.validate_at(depth + 1))
            }
            Self::Or { children } => {
                if children.is_empty() {
                    return Err(AstError::EmptyComposite("OR"));
                }
                children.iter().try_for_each(|c| c.validate_at(depth + 1))
            }
            Self::Not { child } => child.validate_at(depth + 1),
            Self::HasAny { solutions } => {
                if solutions.is_empty() {
                    return Err(AstError::EmptyComposite("HAS_ANY"));
                }
                Ok(())
            }
            Self::HasAll { solutions } => {
                if solutions.is_empty() {
                    return Err(AstError::EmptyComposite("HAS_ALL"));
                }
                Ok(())
            }
            Self::OrderStrict { sequence } | Self::OrderFlex { sequence } => {
                if sequence.is_empty() || sequence.iter().any(Vec::is_empty) {
                    return Err(AstError::EmptyComposite("ORDER"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "ast_tests.rs"]
mod tests;
