// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;
use yare::parameterized;

use super::*;

#[test]
fn wire_shape_uses_screaming_tags() {
    let filter = Filter::And {
        children: vec![
            Filter::Attribute {
                field: AttributeField::LogicalName,
                op: StringOp::BeginsWith,
                value: "acc".to_string(),
            },
            Filter::Managed { value: true },
        ],
    };
    let value = serde_json::to_value(&filter).unwrap();
    assert_eq!(value["tag"], "AND");
    assert_eq!(value["children"][0]["tag"], "ATTRIBUTE");
    assert_eq!(value["children"][0]["field"], "logicalName");
    assert_eq!(value["children"][1]["tag"], "MANAGED");
}

#[test]
fn has_any_decodes_mixed_solution_matchers() {
    let raw = json!({
        "tag": "HAS_ANY",
        "solutions": [
            "Core",
            { "field": "publisher", "op": "Equals", "value": "Contoso" }
        ]
    });
    let filter: Filter = serde_json::from_value(raw).unwrap();
    match filter {
        Filter::HasAny { solutions } => {
            assert_eq!(solutions[0], SolutionMatcher::Name("Core".to_string()));
            assert!(matches!(solutions[1], SolutionMatcher::Query { .. }));
        }
        other => panic!("unexpected filter: {other:?}"),
    }
}

#[test]
fn order_strict_roundtrips() {
    let filter = Filter::OrderStrict {
        sequence: vec![
            vec![SolutionMatcher::Name("Core".to_string())],
            vec![
                SolutionMatcher::Name("ProjA".to_string()),
                SolutionMatcher::Name("ProjB".to_string()),
            ],
        ],
    };
    let value = serde_json::to_value(&filter).unwrap();
    assert_eq!(value["tag"], "ORDER_STRICT");
    let back: Filter = serde_json::from_value(value).unwrap();
    assert_eq!(back, filter);
}

#[test]
fn unknown_tag_fails_to_decode() {
    let raw = json!({ "tag": "FUZZY_MATCH", "value": 1 });
    assert!(serde_json::from_value::<Filter>(raw).is_err());
}

#[parameterized(
    equals = { StringOp::Equals, "Account", "account", true },
    not_equals = { StringOp::NotEquals, "Account", "account", false },
    contains = { StringOp::Contains, "msdyn_account", "ACCOUNT", true },
    not_contains = { StringOp::NotContains, "contact", "account", true },
    begins = { StringOp::BeginsWith, "Account", "acc", true },
    not_begins = { StringOp::NotBeginsWith, "Account", "acc", false },
    ends = { StringOp::EndsWith, "main_form", "FORM", true },
    not_ends = { StringOp::NotEndsWith, "main_form", "grid", true },
)]
fn string_ops_are_case_insensitive(op: StringOp, actual: &str, expected: &str, outcome: bool) {
    assert_eq!(op.matches(actual, expected), outcome);
}

#[test]
fn empty_composites_are_rejected() {
    assert!(Filter::And { children: vec![] }.validate().is_err());
    assert!(Filter::HasAny { solutions: vec![] }.validate().is_err());
    assert!(Filter::OrderStrict { sequence: vec![vec![]] }.validate().is_err());
}

#[test]
fn deep_nesting_is_rejected() {
    let mut filter = Filter::Managed { value: true };
    for _ in 0..40 {
        filter = Filter::Not { child: Box::new(filter) };
    }
    assert!(matches!(filter.validate(), Err(AstError::TooDeep(_))));
}
