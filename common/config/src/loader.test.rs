use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;

fn definition(name: &str, index_type: &str) -> CounterDefinition {
    CounterDefinition {
        name: name.to_string(),
        index_type_name: index_type.to_string(),
        computation_conditions: json!({}),
        evaluation_conditions: None,
        attributes: json!({ "count": { "$sum": 1 } }),
        variables: None,
    }
}

#[test]
fn builds_from_definitions() {
    let set = CounterSet::from_definitions(vec![
        definition("total", "T1"),
        definition("sum", "T1"),
        definition("total", "T2"),
    ])
    .unwrap();
    assert_eq!(set.len(), 3);
    assert!(!set.is_empty());
    assert_eq!(set.index_type_names(), vec!["T1", "T2"]);
}

#[test]
fn rejects_duplicates_within_one_index_type() {
    let err = CounterSet::from_definitions(vec![
        definition("total", "T1"),
        definition("total", "T1"),
    ])
    .unwrap_err();
    match err {
        ConfigError::DuplicateCounter { index_type, name } => {
            assert_eq!(index_type, "T1");
            assert_eq!(name, "total");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn surfaces_validation_failures_with_position() {
    let mut bad = definition("", "T1");
    bad.name = String::new();
    let err = CounterSet::from_definitions(vec![definition("ok", "T1"), bad]).unwrap_err();
    assert!(err.to_string().contains("index 1"));
}

#[test]
fn loads_a_bare_array_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"name":"total","indexTypeName":"T1","computationConditions":{{}},"attributes":{{"count":{{"$sum":1}}}}}}]"#
    )
    .unwrap();
    let set = CounterSet::from_file(file.path()).unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.counters()[0].name, "total");
}

#[test]
fn loads_a_wrapped_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"counters":[{{"name":"total","indexTypeName":"T1","computationConditions":{{}},"attributes":{{}}}}]}}"#
    )
    .unwrap();
    let set = CounterSet::from_file(file.path()).unwrap();
    assert_eq!(set.len(), 1);
}

#[test]
fn missing_file_is_a_distinct_error() {
    let err = CounterSet::from_file(std::path::Path::new("/no/such/file.json")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn invalid_json_names_the_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();
    let err = CounterSet::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidJson { .. }));
}
