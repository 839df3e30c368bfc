use super::*;
use chrono::TimeZone;
use pretty_assertions::assert_eq;

#[test]
fn matches_the_wire_pattern() {
    assert!(is_wire_date("2024-05-01T12:00:00Z"));
    assert!(is_wire_date("2024-05-01T12:00:00.123Z"));
    assert!(is_wire_date("2024-05-01T12:00:00"));
    assert!(is_wire_date("2024-05-01T12:00:00.123"));
}

#[test]
fn rejects_non_dates() {
    assert!(!is_wire_date("2024-05-01"));
    assert!(!is_wire_date("2024-05-01 12:00:00"));
    assert!(!is_wire_date("2024-05-01T12:00:00.12Z"));
    assert!(!is_wire_date("2024-05-01T12:00:00+02:00"));
    assert!(!is_wire_date("not a date"));
    assert!(!is_wire_date(""));
}

#[test]
fn parses_all_accepted_shapes() {
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert_eq!(parse_wire_date("2024-05-01T12:00:00Z"), Some(expected));
    assert_eq!(parse_wire_date("2024-05-01T12:00:00"), Some(expected));
    assert_eq!(
        parse_wire_date("2024-05-01T12:00:00.500Z"),
        Some(expected + chrono::Duration::milliseconds(500)),
    );
}

#[test]
fn parse_rejects_impossible_dates() {
    // Shape matches but the calendar does not.
    assert_eq!(parse_wire_date("2024-13-01T12:00:00Z"), None);
    assert_eq!(parse_wire_date("2024-02-30T12:00:00Z"), None);
}

#[test]
fn format_roundtrips_through_parse() {
    let value = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
        + chrono::Duration::milliseconds(45);
    let text = format_wire_date(value);
    assert_eq!(text, "2023-11-14T22:13:20.045Z");
    assert_eq!(parse_wire_date(&text), Some(value));
}
