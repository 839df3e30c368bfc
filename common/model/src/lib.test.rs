use super::*;
use chrono::TimeZone;
use pretty_assertions::assert_eq;
use serde_json::json;

fn sample_fact() -> Fact {
    Fact {
        id: "fact-1".to_string(),
        fact_type: 3,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        data: json!({
            "userId": "u42",
            "amount": 150,
            "eventDate": "2024-04-30T08:15:00.000Z",
            "badDate": "not-a-date",
        }),
    }
}

#[test]
fn data_value_returns_present_field() {
    let fact = sample_fact();
    assert_eq!(fact.data_value("userId"), Some(&json!("u42")));
    assert_eq!(fact.data_value("missing"), None);
}

#[test]
fn data_value_on_non_object_payload() {
    let mut fact = sample_fact();
    fact.data = json!(42);
    assert_eq!(fact.data_value("userId"), None);
}

#[test]
fn fact_serde_uses_wire_field_names() {
    let fact = sample_fact();
    let value = serde_json::to_value(&fact).unwrap();
    assert!(value.get("_id").is_some());
    assert!(value.get("type").is_some());
    assert!(value.get("createdAt").is_some());

    let back: Fact = serde_json::from_value(value).unwrap();
    assert_eq!(back.id, fact.id);
    assert_eq!(back.fact_type, fact.fact_type);
}

#[test]
fn resolve_entry_dt_prefers_named_field() {
    let fact = sample_fact();
    let dt = resolve_entry_dt(&fact, "eventDate");
    assert_eq!(dt, Utc.with_ymd_and_hms(2024, 4, 30, 8, 15, 0).unwrap());
}

#[test]
fn resolve_entry_dt_falls_back_on_missing_field() {
    let fact = sample_fact();
    assert_eq!(resolve_entry_dt(&fact, "noSuchField"), fact.created_at);
}

#[test]
fn resolve_entry_dt_falls_back_on_unparsable_value() {
    let fact = sample_fact();
    assert_eq!(resolve_entry_dt(&fact, "badDate"), fact.created_at);
    assert_eq!(resolve_entry_dt(&fact, "amount"), fact.created_at);
}

#[test]
fn resolve_entry_dt_accepts_zoneless_dates() {
    let mut fact = sample_fact();
    fact.data = json!({ "eventDate": "2024-04-30T08:15:00" });
    let dt = resolve_entry_dt(&fact, "eventDate");
    assert_eq!(dt, Utc.with_ymd_and_hms(2024, 4, 30, 8, 15, 0).unwrap());
}

#[test]
fn index_entry_serde_roundtrip() {
    let entry = IndexEntry {
        hash: "1:abc".to_string(),
        fact_id: "fact-1".to_string(),
        dt: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 1).unwrap(),
        data: None,
    };
    let value = serde_json::to_value(&entry).unwrap();
    assert!(value.get("h").is_some());
    assert!(value.get("f").is_some());
    // Absent embedded data is not serialized at all.
    assert!(value.get("data").is_none());

    let back: IndexEntry = serde_json::from_value(value).unwrap();
    assert_eq!(back.hash, entry.hash);
    assert_eq!(back.fact_id, entry.fact_id);
}
