#![cfg(feature = "serde")]

//! Integration tests for serde support in sylva.
//!
//! These tests verify that the persistent collections round-trip through
//! serde formats and keep their ordering guarantees on the way back in.

use rstest::rstest;
use sylva::persistent::{PersistentTreeMap, PersistentTreeSet};

// =============================================================================
// PersistentTreeMap Integration Tests
// =============================================================================

#[rstest]
fn test_treemap_json_roundtrip() {
    let map: PersistentTreeMap<String, i32> = (1..=10)
        .map(|key| (format!("key{key:02}"), key))
        .collect();

    let json = serde_json::to_string(&map).unwrap();
    let restored: PersistentTreeMap<String, i32> = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, map);
}

#[rstest]
fn test_treemap_serializes_in_key_order() {
    let map = PersistentTreeMap::new()
        .insert("b".to_string(), 2)
        .insert("a".to_string(), 1);

    let json = serde_json::to_string(&map).unwrap();
    assert_eq!(json, r#"{"a":1,"b":2}"#);
}

#[rstest]
fn test_treemap_deserialized_map_is_ordered() {
    let restored: PersistentTreeMap<String, i32> =
        serde_json::from_str(r#"{"c":3,"a":1,"b":2}"#).unwrap();

    let keys: Vec<&String> = restored.keys().collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
}

#[rstest]
fn test_empty_treemap_roundtrip() {
    let map: PersistentTreeMap<String, i32> = PersistentTreeMap::new();
    let json = serde_json::to_string(&map).unwrap();
    assert_eq!(json, "{}");

    let restored: PersistentTreeMap<String, i32> = serde_json::from_str(&json).unwrap();
    assert!(restored.is_empty());
}

// =============================================================================
// PersistentTreeSet Integration Tests
// =============================================================================

#[rstest]
fn test_tree_set_json_roundtrip() {
    let set: PersistentTreeSet<i32> = (1..=10).collect();

    let json = serde_json::to_string(&set).unwrap();
    let restored: PersistentTreeSet<i32> = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, set);
}

#[rstest]
fn test_tree_set_serializes_in_element_order() {
    let set = PersistentTreeSet::new().insert(3).insert(1).insert(2);
    let json = serde_json::to_string(&set).unwrap();
    assert_eq!(json, "[1,2,3]");
}

#[rstest]
fn test_tree_set_deserialization_deduplicates() {
    let restored: PersistentTreeSet<i32> = serde_json::from_str("[3,1,2,3,1]").unwrap();
    assert_eq!(restored.len(), 3);
    let elements: Vec<&i32> = restored.iter().collect();
    assert_eq!(elements, vec![&1, &2, &3]);
}
