//! Symmetric JSON↔BSON conversion across the process boundary.
//!
//! The wire format is plain JSON, so the worker converts incoming pipeline
//! stages to BSON before handing them to the driver, and converts result
//! documents back to wire JSON. The parent applies the same wire→BSON
//! conversion on delivery, which rematerializes every date-shaped string as
//! a real timestamp. Both walks are purely functional; inputs are never
//! mutated.

use bson::Bson;
use bson::Document;
use serde_json::Value;

use crate::dates::format_wire_date;
use crate::dates::is_wire_date;
use crate::dates::parse_wire_date;
use crate::error::ProtocolError;
use crate::error::Result;

/// Convert a wire JSON value into BSON.
///
/// Strings matching the wire date pattern become [`Bson::DateTime`];
/// matching strings that still fail to parse (impossible calendar dates)
/// are kept as strings and logged. Integer-valued numbers map to `Int64`
/// when they do not fit in `Int32`.
pub fn wire_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if let Ok(small) = i32::try_from(i) {
                    Bson::Int32(small)
                } else {
                    Bson::Int64(i)
                }
            } else {
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => {
            if is_wire_date(s) {
                match parse_wire_date(s) {
                    Some(ts) => Bson::DateTime(bson::DateTime::from_chrono(ts)),
                    None => {
                        tracing::warn!(value = %s, "Date-shaped string failed to parse");
                        Bson::String(s.clone())
                    }
                }
            } else {
                Bson::String(s.clone())
            }
        }
        Value::Array(items) => Bson::Array(items.iter().map(wire_to_bson).collect()),
        Value::Object(map) => {
            let mut doc = Document::new();
            for (key, item) in map {
                doc.insert(key.clone(), wire_to_bson(item));
            }
            Bson::Document(doc)
        }
    }
}

/// Convert a wire JSON object into a BSON document.
///
/// Fails when the value is not an object; used for pipeline stages, which
/// must each be a document.
pub fn wire_to_document(value: &Value, index: usize) -> Result<Document> {
    match wire_to_bson(value) {
        Bson::Document(doc) => Ok(doc),
        _ => Err(ProtocolError::InvalidStage { index }),
    }
}

/// Convert a BSON value into wire JSON.
///
/// `Bson::DateTime` renders as the canonical ISO-8601 wire string. Types
/// JSON cannot express directly (object ids, decimals, binary) fall back to
/// the driver's relaxed extended-JSON rendering.
pub fn bson_to_wire(value: &Bson) -> Value {
    match value {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(d) => Value::from(*d),
        Bson::String(s) => Value::String(s.clone()),
        Bson::DateTime(dt) => Value::String(format_wire_date(dt.to_chrono())),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_wire).collect()),
        Bson::Document(doc) => {
            let mut map = serde_json::Map::with_capacity(doc.len());
            for (key, item) in doc {
                map.insert(key.clone(), bson_to_wire(item));
            }
            Value::Object(map)
        }
        other => other.clone().into_relaxed_extjson(),
    }
}

#[cfg(test)]
#[path = "bridge.test.rs"]
mod tests;
