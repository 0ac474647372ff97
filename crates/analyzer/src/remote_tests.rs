// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn change_record_parses_attribute_names() {
    assert_eq!(
        parse_changes(r#"["displayname","description"]"#),
        vec!["displayname".to_string(), "description".to_string()]
    );
    assert!(parse_changes("").is_empty());
    assert!(parse_changes("not json").is_empty());
}

#[test]
fn type_codes_map_to_names() {
    assert_eq!(component_type_name(1), "Entity");
    assert_eq!(component_type_name(60), "SystemForm");
    assert_eq!(component_type_name(9999), "Unknown");
}

#[test]
fn entity_scoped_kinds_need_table_resolution() {
    assert!(is_entity_scoped(2), "attributes are entity-scoped");
    assert!(is_entity_scoped(24), "forms are entity-scoped");
    assert!(!is_entity_scoped(1), "entities are tables themselves");
    assert!(!is_entity_scoped(61), "web resources are standalone");
}
