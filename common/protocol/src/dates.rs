//! Wire representation of timestamps.
//!
//! Dates travel as ISO-8601 strings. The pattern is deliberately narrow:
//! four-digit year, optional millisecond fraction, optional `Z`. Anything
//! else is an ordinary string and must pass through untouched.

use std::sync::LazyLock;

use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;
use regex::Regex;

static WIRE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{3})?Z?$").expect("invalid regex")
});

/// Whether `text` has the shape of a wire date.
pub fn is_wire_date(text: &str) -> bool {
    WIRE_DATE_RE.is_match(text)
}

/// Parse a wire date into a UTC timestamp.
///
/// Returns `None` when the text does not match the wire pattern or names an
/// impossible calendar date.
pub fn parse_wire_date(text: &str) -> Option<DateTime<Utc>> {
    if !is_wire_date(text) {
        return None;
    }
    let bare = text.strip_suffix('Z').unwrap_or(text);
    let format = if bare.contains('.') {
        "%Y-%m-%dT%H:%M:%S%.3f"
    } else {
        "%Y-%m-%dT%H:%M:%S"
    };
    NaiveDateTime::parse_from_str(bare, format)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Render a timestamp in the canonical wire form (millisecond precision,
/// trailing `Z`).
pub fn format_wire_date(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
#[path = "dates.test.rs"]
mod tests;
