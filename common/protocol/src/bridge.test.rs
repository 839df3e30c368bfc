use super::*;
use bson::doc;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn date_strings_rematerialize_at_any_depth() {
    let value = json!({
        "outer": {
            "when": "2024-05-01T12:00:00.000Z",
            "items": [ { "at": "2024-05-01T00:00:00Z" }, "plain" ],
        },
        "label": "2024-05-01",
    });
    let bson = wire_to_bson(&value);
    let doc = match bson {
        Bson::Document(doc) => doc,
        other => panic!("expected document, got {other:?}"),
    };
    let outer = doc.get_document("outer").unwrap();
    assert!(matches!(outer.get("when"), Some(Bson::DateTime(_))));
    let first = outer.get_array("items").unwrap()[0]
        .as_document()
        .unwrap();
    assert!(matches!(first.get("at"), Some(Bson::DateTime(_))));
    // Strings that do not match the pattern stay strings.
    assert_eq!(outer.get_array("items").unwrap()[1], Bson::String("plain".to_string()));
    assert_eq!(doc.get_str("label").unwrap(), "2024-05-01");
}

#[test]
fn numbers_pick_the_narrowest_integer() {
    let value = json!({ "small": 7, "big": 9_000_000_000i64, "frac": 2.5 });
    let doc = match wire_to_bson(&value) {
        Bson::Document(doc) => doc,
        other => panic!("expected document, got {other:?}"),
    };
    assert_eq!(doc.get("small"), Some(&Bson::Int32(7)));
    assert_eq!(doc.get("big"), Some(&Bson::Int64(9_000_000_000)));
    assert_eq!(doc.get("frac"), Some(&Bson::Double(2.5)));
}

#[test]
fn bson_dates_render_as_wire_strings() {
    let when = bson::DateTime::from_chrono(
        chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00.250Z")
            .unwrap()
            .to_utc(),
    );
    let doc = doc! { "when": when, "nested": { "also": when }, "n": 3i32 };
    let value = bson_to_wire(&Bson::Document(doc));
    assert_eq!(value["when"], "2024-05-01T12:00:00.250Z");
    assert_eq!(value["nested"]["also"], "2024-05-01T12:00:00.250Z");
    assert_eq!(value["n"], 3);
}

#[test]
fn conversion_is_symmetric_for_documents_with_dates() {
    let original = json!({
        "f": "fact-1",
        "dt": "2024-05-01T12:00:00.000Z",
        "tags": ["a", "b"],
        "count": 3,
    });
    let roundtripped = bson_to_wire(&wire_to_bson(&original));
    assert_eq!(roundtripped, original);
}

#[test]
fn stage_must_be_an_object() {
    assert!(wire_to_document(&json!({ "$match": {} }), 0).is_ok());
    let err = wire_to_document(&json!([1, 2]), 3).unwrap_err();
    assert!(err.to_string().contains("stage 3"));
}

#[test]
fn object_ids_become_hex_strings() {
    let oid = bson::oid::ObjectId::new();
    let value = bson_to_wire(&Bson::ObjectId(oid));
    assert_eq!(value, json!(oid.to_hex()));
}
