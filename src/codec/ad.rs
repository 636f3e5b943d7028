//! Active Directory specific value encodings.

use super::syntax::{format_unicode, parse_iso8601, to_iso8601};
use super::Element;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Number, Value};
use uuid::Uuid;

pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Seconds between 1601-01-01 and 1970-01-01.
pub const EPOCH_OFFSET_SECONDS: i64 = 11_644_473_600;

/// `accountExpires` value meaning the account never expires.
pub const NEVER_EXPIRES: i64 = i64::MAX;

pub const NEVER_LITERAL: &str = "never";

/// Interval value AD uses for "never" (e.g. `maxPwdAge`).
pub const NEVER_INTERVAL: i64 = i64::MIN;

/// Largest interval a caller sees, in seconds; maps back to `NEVER_INTERVAL`.
pub const MAX_INTERVAL_SECONDS: f64 = 86_399_999_999_999.999_999;

fn parse_ticks(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

/// Latest representable timestamp; the sentinel tick value formats to it.
pub fn max_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .earliest()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        + chrono::Duration::microseconds(999_999)
}

pub fn ticks_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks == NEVER_EXPIRES {
        return Some(max_timestamp());
    }
    let ticks = ticks.checked_abs()?;
    let seconds = ticks.div_euclid(TICKS_PER_SECOND) - EPOCH_OFFSET_SECONDS;
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos)
}

pub fn datetime_to_ticks(dt: &DateTime<Utc>) -> Option<i64> {
    if *dt >= max_timestamp() {
        return Some(NEVER_EXPIRES);
    }
    let seconds = dt.timestamp().checked_add(EPOCH_OFFSET_SECONDS)?;
    let ticks = seconds
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(dt.timestamp_subsec_nanos() / 100))?;
    (ticks >= 0).then_some(ticks)
}

pub fn format_ad_timestamp(raw: &[u8]) -> Value {
    parse_ticks(raw)
        .and_then(ticks_to_datetime)
        .map(|dt| Value::String(to_iso8601(&dt)))
        .unwrap_or_else(|| format_unicode(raw))
}

/// Accepts an ISO-8601 string (converted to ticks) or a tick count already
/// in range (kept as is).
pub fn validate_ad_timestamp(value: &Value) -> Option<Element> {
    match value {
        Value::Number(n) => n.as_i64().filter(|t| *t >= 0).map(|_| Element::Keep),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                return s.parse::<i64>().ok().map(|_| Element::Keep);
            }
            let ticks = parse_iso8601(s).as_ref().and_then(datetime_to_ticks)?;
            Some(Element::Wire(ticks.to_string().into_bytes()))
        }
        _ => None,
    }
}

/// `pwdLastSet` can only be written as `0` (must change) or `-1` (now);
/// positive values pass through for compatibility.
pub fn validate_password_last_set(value: &Value) -> Option<Element> {
    let n = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (n >= -1).then_some(Element::Keep)
}

pub fn format_account_expires(raw: &[u8]) -> Value {
    match parse_ticks(raw) {
        Some(NEVER_EXPIRES) => Value::String(NEVER_LITERAL.to_string()),
        _ => format_ad_timestamp(raw),
    }
}

pub fn validate_account_expires(value: &Value) -> Option<Element> {
    match value {
        Value::String(s) if s.trim().eq_ignore_ascii_case(NEVER_LITERAL) => {
            Some(Element::Wire(NEVER_EXPIRES.to_string().into_bytes()))
        }
        other => validate_ad_timestamp(other),
    }
}

/// Negative tick intervals become positive fractional seconds.
pub fn format_ad_interval(raw: &[u8]) -> Value {
    let seconds = match parse_ticks(raw) {
        Some(NEVER_INTERVAL) => MAX_INTERVAL_SECONDS,
        Some(ticks) => ticks.unsigned_abs() as f64 / TICKS_PER_SECOND as f64,
        None => return format_unicode(raw),
    };
    Number::from_f64(seconds)
        .map(Value::Number)
        .unwrap_or_else(|| format_unicode(raw))
}

pub fn validate_ad_interval(value: &Value) -> Option<Element> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let ticks = if seconds >= MAX_INTERVAL_SECONDS {
        NEVER_INTERVAL
    } else {
        (-(seconds * TICKS_PER_SECOND as f64)).round() as i64
    };
    Some(Element::Wire(ticks.to_string().into_bytes()))
}

/// Binary SID to its `S-R-A-S1-S2...` string form.
pub fn sid_to_string(raw: &[u8]) -> Option<String> {
    if raw.len() < 8 {
        return None;
    }
    let revision = raw[0];
    let count = raw[1] as usize;
    if raw.len() != 8 + count * 4 {
        return None;
    }
    let authority = raw[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut sid = format!("S-{}-{}", revision, authority);
    for chunk in raw[8..].chunks_exact(4) {
        let sub = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        sid.push_str(&format!("-{}", sub));
    }
    Some(sid)
}

pub fn sid_from_string(s: &str) -> Option<Vec<u8>> {
    let mut parts = s.trim().split('-');
    if !parts.next()?.eq_ignore_ascii_case("S") {
        return None;
    }
    let revision: u8 = parts.next()?.parse().ok()?;
    let authority: u64 = parts.next()?.parse().ok()?;
    if authority >= 1 << 48 {
        return None;
    }
    let subs = parts
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    if subs.len() > 15 {
        return None;
    }

    let mut raw = vec![revision, subs.len() as u8];
    raw.extend_from_slice(&authority.to_be_bytes()[2..]);
    for sub in subs {
        raw.extend_from_slice(&sub.to_le_bytes());
    }
    Some(raw)
}

pub fn format_sid(raw: &[u8]) -> Value {
    sid_to_string(raw)
        .map(Value::String)
        .unwrap_or_else(|| format_unicode(raw))
}

pub fn validate_sid(value: &Value) -> Option<Element> {
    match value {
        Value::String(s) => sid_from_string(s).map(Element::Wire),
        _ => None,
    }
}

/// Little-endian GUID bytes (as `objectGUID` is stored) to `{hyphenated}`.
pub fn format_guid_le(raw: &[u8]) -> Value {
    match <[u8; 16]>::try_from(raw) {
        Ok(bytes) => Value::String(format!("{{{}}}", Uuid::from_bytes_le(bytes).hyphenated())),
        Err(_) => format_unicode(raw),
    }
}

pub fn validate_guid_le(value: &Value) -> Option<Element> {
    let text = match value {
        Value::String(s) => s.trim().trim_start_matches('{').trim_end_matches('}'),
        _ => return None,
    };
    let uuid = Uuid::parse_str(text).ok()?;
    Some(Element::Wire(uuid.to_bytes_le().to_vec()))
}

/// `unicodePwd` takes a double-quoted password encoded as UTF-16LE.
pub fn encode_unicode_password(password: &str) -> Vec<u8> {
    let quoted = if password.len() >= 2 && password.starts_with('"') && password.ends_with('"') {
        password.to_string()
    } else {
        format!("\"{}\"", password)
    };
    quoted.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

pub fn validate_unicode_password(value: &Value) -> Option<Element> {
    match value {
        Value::String(s) => Some(Element::Wire(encode_unicode_password(s))),
        _ => None,
    }
}
