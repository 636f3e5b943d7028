//! Formatters and validators for the standard LDAP syntaxes.

use super::{external_to_text, Element};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Text as-is. Bytes that are not UTF-8 come out as base64, which the text
/// validator stores verbatim, so those values do not round-trip.
pub fn format_unicode(raw: &[u8]) -> Value {
    match std::str::from_utf8(raw) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => format_binary(raw),
    }
}

pub fn format_integer(raw: &[u8]) -> Value {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(Value::from)
        .unwrap_or_else(|| format_unicode(raw))
}

pub fn format_boolean(raw: &[u8]) -> Value {
    match raw {
        b"TRUE" => Value::Bool(true),
        b"FALSE" => Value::Bool(false),
        _ => format_unicode(raw),
    }
}

pub fn format_binary(raw: &[u8]) -> Value {
    Value::String(BASE64.encode(raw))
}

pub fn format_time(raw: &[u8]) -> Value {
    std::str::from_utf8(raw)
        .ok()
        .and_then(parse_generalized_time)
        .map(|dt| Value::String(to_iso8601(&dt)))
        .unwrap_or_else(|| format_unicode(raw))
}

/// Any JSON scalar is accepted and stored as its text form.
pub fn validate_text(value: &Value) -> Option<Element> {
    external_to_text(value).map(|_| Element::Keep)
}

pub fn validate_integer(value: &Value) -> Option<Element> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(Element::Keep),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .map(|i| Element::Wire(i.to_string().into_bytes())),
        _ => None,
    }
}

pub fn validate_boolean(value: &Value) -> Option<Element> {
    let flag = match value {
        Value::Bool(b) => *b,
        Value::String(s) if s.eq_ignore_ascii_case("true") => true,
        Value::String(s) if s.eq_ignore_ascii_case("false") => false,
        _ => return None,
    };
    let wire: &[u8] = if flag { b"TRUE" } else { b"FALSE" };
    Some(Element::Wire(wire.to_vec()))
}

pub fn validate_binary(value: &Value) -> Option<Element> {
    match value {
        Value::String(s) => BASE64.decode(s.trim()).ok().map(Element::Wire),
        _ => None,
    }
}

/// AD stores generalized time with a tenths fraction: `YYYYMMDDHHMMSS.0Z`.
pub fn validate_time_tenths(value: &Value) -> Option<Element> {
    let text = match value {
        Value::String(s) => s.trim(),
        _ => return None,
    };
    let dt = parse_iso8601(text).or_else(|| parse_generalized_time(text))?;
    Some(Element::Wire(to_generalized_time_tenths(&dt).into_bytes()))
}

pub fn to_iso8601(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

pub fn to_generalized_time_tenths(dt: &DateTime<Utc>) -> String {
    format!("{}.0Z", dt.format("%Y%m%d%H%M%S"))
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn generalized_time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(\d{4})(\d{2})(\d{2})(\d{2})(\d{2})?(\d{2})?(?:[.,](\d+))?(Z|[+-]\d{2}(?:\d{2})?)?$",
        )
        .expect("generalized time pattern is valid")
    })
}

/// Parses `YYYYMMDDHH[MM[SS]][.f](Z|+hhmm|-hhmm)`; no zone means UTC.
pub fn parse_generalized_time(s: &str) -> Option<DateTime<Utc>> {
    let caps = generalized_time_pattern().captures(s.trim())?;
    let num = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u32>().ok());

    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?.and_hms_opt(
        num(4)?,
        num(5)?,
        num(6)?,
    )?;

    let nanos = match caps.get(7) {
        Some(m) => {
            let digits: String = m.as_str().chars().chain("000000000".chars()).take(9).collect();
            digits.parse::<i64>().ok()?
        }
        None => 0,
    };

    let offset_seconds = match caps.get(8).map(|m| m.as_str()) {
        None | Some("Z") => 0,
        Some(zone) => {
            let sign = if zone.starts_with('-') { -1 } else { 1 };
            let hours: i32 = zone[1..3].parse().ok()?;
            let minutes: i32 = if zone.len() == 5 { zone[3..5].parse().ok()? } else { 0 };
            sign * (hours * 3600 + minutes * 60)
        }
    };

    let utc = Utc.from_utc_datetime(&naive) - chrono::Duration::seconds(offset_seconds as i64)
        + chrono::Duration::nanoseconds(nanos);
    Some(utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(element: Option<Element>) -> Vec<u8> {
        match element {
            Some(Element::Wire(bytes)) => bytes,
            other => panic!("expected wire value, got {:?}", other),
        }
    }

    #[test]
    fn test_format_unicode_falls_back_to_base64() {
        assert_eq!(format_unicode(b"hello"), json!("hello"));
        assert_eq!(format_unicode(&[0xff, 0xfe]), json!("//4="));
        // written back, the base64 text is kept as-is
        assert!(matches!(validate_text(&json!("//4=")), Some(Element::Keep)));
    }

    #[test]
    fn test_format_integer() {
        assert_eq!(format_integer(b"512"), json!(512));
        assert_eq!(format_integer(b"-2147483646"), json!(-2147483646));
        assert_eq!(format_integer(b"abc"), json!("abc"));
    }

    #[test]
    fn test_boolean_round_trip() {
        assert_eq!(format_boolean(b"TRUE"), json!(true));
        assert_eq!(format_boolean(b"FALSE"), json!(false));
        assert_eq!(format_boolean(b"maybe"), json!("maybe"));

        assert_eq!(wire(validate_boolean(&json!(true))), b"TRUE".to_vec());
        assert_eq!(wire(validate_boolean(&json!("False"))), b"FALSE".to_vec());
        assert!(validate_boolean(&json!("yes")).is_none());
        assert!(validate_boolean(&json!(1)).is_none());
    }

    #[test]
    fn test_integer_validation() {
        assert!(matches!(validate_integer(&json!(42)), Some(Element::Keep)));
        assert_eq!(wire(validate_integer(&json!(" 66048 "))), b"66048".to_vec());
        assert!(validate_integer(&json!(1.5)).is_none());
        assert!(validate_integer(&json!(true)).is_none());
        assert!(validate_integer(&json!("twelve")).is_none());
    }

    #[test]
    fn test_binary_round_trip() {
        let raw = vec![0u8, 1, 2, 254, 255];
        let formatted = format_binary(&raw);
        assert_eq!(wire(validate_binary(&formatted)), raw);
        assert!(validate_binary(&json!("not base64!")).is_none());
    }

    #[test]
    fn test_format_time_to_utc() {
        assert_eq!(format_time(b"20210102030405.0Z"), json!("2021-01-02T03:04:05+00:00"));
        assert_eq!(format_time(b"20210102030405+0100"), json!("2021-01-02T02:04:05+00:00"));
        assert_eq!(format_time(b"garbage"), json!("garbage"));
    }

    #[test]
    fn test_time_tenths_marker() {
        assert_eq!(
            wire(validate_time_tenths(&json!("2021-01-02T03:04:05+00:00"))),
            b"20210102030405.0Z".to_vec()
        );
        assert_eq!(
            wire(validate_time_tenths(&json!("2021-01-02T05:04:05+02:00"))),
            b"20210102030405.0Z".to_vec()
        );
        assert!(validate_time_tenths(&json!("yesterday")).is_none());
    }

    #[test]
    fn test_time_round_trip() {
        let formatted = format_time(b"20210102030405.0Z");
        assert_eq!(wire(validate_time_tenths(&formatted)), b"20210102030405.0Z".to_vec());
    }

    #[test]
    fn test_parse_iso8601_variants() {
        let expected = Utc.with_ymd_and_hms(2023, 12, 25, 10, 30, 0).unwrap();
        assert_eq!(parse_iso8601("2023-12-25T10:30:00Z"), Some(expected));
        assert_eq!(parse_iso8601("2023-12-25T10:30:00"), Some(expected));
        assert_eq!(parse_iso8601("2023-12-25 11:30:00+01:00"), Some(expected));
        assert_eq!(
            parse_iso8601("2023-12-25"),
            Some(Utc.with_ymd_and_hms(2023, 12, 25, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_iso8601("12/25/2023"), None);
    }

    #[test]
    fn test_parse_generalized_time_fraction() {
        let dt = parse_generalized_time("20231225103000.5Z").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 500);
        assert!(parse_generalized_time("2023122510").is_some());
        assert!(parse_generalized_time("20231325103000Z").is_none());
    }
}
