use super::*;
use pretty_assertions::assert_eq;

#[test]
fn defaults_are_sensible() {
    let settings = CoordinatorSettings::default();
    assert_eq!(settings.facts_collection, "facts");
    assert_eq!(settings.index_collection, "factIndex");
    assert_eq!(settings.depth_limit, MAX_DEPTH_LIMIT);
    assert!(settings.exclude_current_fact);
    assert!(!settings.single_stage);
    assert!(!settings.debug);
}

#[test]
fn effective_limit_defaults_to_one_hundred() {
    let settings = CoordinatorSettings::default();
    assert_eq!(settings.effective_limit(), 100);
}

#[test]
fn effective_limit_is_bounded_by_the_depth_limit() {
    let settings = CoordinatorSettings {
        depth_limit: 50,
        per_type_limit: Some(500),
        ..CoordinatorSettings::default()
    };
    assert_eq!(settings.effective_limit(), 50);
}

#[test]
fn depth_limit_never_exceeds_the_ceiling() {
    let settings = CoordinatorSettings {
        depth_limit: 10_000,
        per_type_limit: Some(5_000),
        ..CoordinatorSettings::default()
    };
    assert_eq!(settings.effective_limit(), MAX_DEPTH_LIMIT);
}

#[test]
fn deserializes_with_defaults() {
    let settings: CoordinatorSettings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings, CoordinatorSettings::default());

    let settings: CoordinatorSettings = serde_json::from_str(
        r#"{ "singleStage": true, "perTypeLimit": 25, "depthFromDate": "2024-04-01T00:00:00Z" }"#,
    )
    .unwrap();
    assert!(settings.single_stage);
    assert_eq!(settings.effective_limit(), 25);
    assert!(settings.depth_from_date.is_some());
}
