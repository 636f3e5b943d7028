//! Schema-driven dispatch between AD wire values and JSON values.
//!
//! Every attribute resolves to one `Formatter` (wire → JSON) and one
//! `Validator` (JSON → wire). Resolution consults, in order: the
//! short-circuit list, the per-attribute OID overrides, the per-syntax
//! defaults, and finally plain text.

pub mod ad;
pub mod syntax;

use crate::schema::{syntax as oid, SchemaRegistry};
use serde_json::Value;

pub type WireValue = Vec<u8>;

/// Attributes whose external values are never reinterpreted by syntax.
pub const SHORT_CIRCUIT_ATTRIBUTES: &[&str] = &["unicodePwd", "userPassword"];

/// Outcome of validating one attribute's external values.
#[derive(Debug, Clone, PartialEq)]
pub enum Validated {
    /// Accepted as given; the external values are stored as UTF-8 text.
    Unchanged,
    /// Accepted with these wire values substituted.
    Replaced(Vec<WireValue>),
    Invalid,
}

/// Per-value validation result.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Keep,
    Wire(WireValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    Unicode,
    Integer,
    Boolean,
    Binary,
    Time,
    AdTimestamp,
    AccountExpires,
    AdInterval,
    Sid,
    GuidLe,
}

impl Formatter {
    pub fn format(self, raw: &[u8]) -> Value {
        match self {
            Formatter::Unicode => syntax::format_unicode(raw),
            Formatter::Integer => syntax::format_integer(raw),
            Formatter::Boolean => syntax::format_boolean(raw),
            Formatter::Binary => syntax::format_binary(raw),
            Formatter::Time => syntax::format_time(raw),
            Formatter::AdTimestamp => ad::format_ad_timestamp(raw),
            Formatter::AccountExpires => ad::format_account_expires(raw),
            Formatter::AdInterval => ad::format_ad_interval(raw),
            Formatter::Sid => ad::format_sid(raw),
            Formatter::GuidLe => ad::format_guid_le(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    AlwaysValid,
    Integer,
    Boolean,
    Binary,
    TimeTenths,
    AdTimestamp,
    AccountExpires,
    PasswordLastSet,
    AdInterval,
    Sid,
    GuidLe,
    UnicodePassword,
}

impl Validator {
    pub fn validate(self, values: &[Value]) -> Validated {
        match self {
            Validator::AlwaysValid => validate_each(values, syntax::validate_text),
            Validator::Integer => validate_each(values, syntax::validate_integer),
            Validator::Boolean => validate_each(values, syntax::validate_boolean),
            Validator::Binary => validate_each(values, syntax::validate_binary),
            Validator::TimeTenths => validate_each(values, syntax::validate_time_tenths),
            Validator::AdTimestamp => validate_each(values, ad::validate_ad_timestamp),
            Validator::AccountExpires => validate_each(values, ad::validate_account_expires),
            Validator::PasswordLastSet => validate_each(values, ad::validate_password_last_set),
            Validator::AdInterval => validate_each(values, ad::validate_ad_interval),
            Validator::Sid => validate_each(values, ad::validate_sid),
            Validator::GuidLe => validate_each(values, ad::validate_guid_le),
            // Only the first value counts; AD accepts a single password.
            Validator::UnicodePassword => match values.first().map(ad::validate_unicode_password) {
                Some(Some(Element::Wire(wire))) => Validated::Replaced(vec![wire]),
                _ => Validated::Invalid,
            },
        }
    }
}

fn validate_each<F>(values: &[Value], check: F) -> Validated
where
    F: Fn(&Value) -> Option<Element>,
{
    let mut changed = false;
    let mut wire = Vec::with_capacity(values.len());

    for value in values {
        match check(value) {
            Some(Element::Keep) => match external_to_text(value) {
                Some(text) => wire.push(text.into_bytes()),
                None => return Validated::Invalid,
            },
            Some(Element::Wire(bytes)) => {
                changed = true;
                wire.push(bytes);
            }
            None => return Validated::Invalid,
        }
    }

    if changed {
        Validated::Replaced(wire)
    } else {
        Validated::Unchanged
    }
}

/// Text form of a JSON scalar as stored on the wire.
pub fn external_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("TRUE".to_string()),
        Value::Bool(false) => Some("FALSE".to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Treats a non-list value as a one-element list; `null` is no values.
pub fn as_value_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(values) => values.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Formatter and validator resolved for one attribute. `formatter` is
/// `None` for write-only attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecEntry {
    pub formatter: Option<Formatter>,
    pub validator: Validator,
}

fn syntax_default(syntax: &str) -> (Formatter, Validator) {
    match syntax {
        oid::BOOLEAN => (Formatter::Boolean, Validator::Boolean),
        oid::INTEGER | oid::LARGE_INTEGER => (Formatter::Integer, Validator::Integer),
        oid::GENERALIZED_TIME | oid::UTC_TIME | oid::NOVELL_TIME => {
            (Formatter::Time, Validator::TimeTenths)
        }
        oid::BINARY | oid::OCTET_STRING | oid::DN_BINARY | oid::SECURITY_DESCRIPTOR => {
            (Formatter::Binary, Validator::Binary)
        }
        _ => (Formatter::Unicode, Validator::AlwaysValid),
    }
}

fn attribute_override(attribute_oid: &str) -> (Option<Formatter>, Option<Validator>) {
    match attribute_oid {
        // accountExpires
        "1.2.840.113556.1.4.159" => (Some(Formatter::AccountExpires), Some(Validator::AccountExpires)),
        // badPasswordTime, lastLogoff, lastLogon, lastLogonTimestamp, lockoutTime
        "1.2.840.113556.1.4.49"
        | "1.2.840.113556.1.4.51"
        | "1.2.840.113556.1.4.52"
        | "1.2.840.113556.1.4.1696"
        | "1.2.840.113556.1.4.662" => (Some(Formatter::AdTimestamp), Some(Validator::AdTimestamp)),
        // pwdLastSet
        "1.2.840.113556.1.4.96" => (Some(Formatter::AdTimestamp), Some(Validator::PasswordLastSet)),
        // forceLogoff, lockoutDuration, lockOutObservationWindow, maxPwdAge, minPwdAge
        "1.2.840.113556.1.4.39"
        | "1.2.840.113556.1.4.60"
        | "1.2.840.113556.1.4.61"
        | "1.2.840.113556.1.4.74"
        | "1.2.840.113556.1.4.78" => (Some(Formatter::AdInterval), Some(Validator::AdInterval)),
        // objectSid, sIDHistory, tokenGroups
        "1.2.840.113556.1.4.146" | "1.2.840.113556.1.4.609" | "1.2.840.113556.1.4.1301" => {
            (Some(Formatter::Sid), Some(Validator::Sid))
        }
        // objectGUID
        "1.2.840.113556.1.4.2" => (Some(Formatter::GuidLe), Some(Validator::GuidLe)),
        // unicodePwd
        "1.2.840.113556.1.4.90" => (None, Some(Validator::UnicodePassword)),
        // wellKnownObjects, otherWellKnownObjects
        "1.2.840.113556.1.4.618" | "1.2.840.113556.1.4.1359" => {
            (Some(Formatter::Unicode), Some(Validator::AlwaysValid))
        }
        _ => (None, None),
    }
}

fn is_short_circuit(name: &str) -> bool {
    SHORT_CIRCUIT_ATTRIBUTES
        .iter()
        .any(|attr| attr.eq_ignore_ascii_case(name))
}

/// Process-wide codec dispatch, immutable after construction.
#[derive(Debug, Clone)]
pub struct CodecTable {
    schema: SchemaRegistry,
}

impl CodecTable {
    pub fn new(schema: SchemaRegistry) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn resolve(&self, name: &str) -> CodecEntry {
        let attr = self.schema.descriptor(name);

        if is_short_circuit(name) || is_short_circuit(attr.name()) {
            return if attr.name().eq_ignore_ascii_case("unicodePwd")
                || name.eq_ignore_ascii_case("unicodePwd")
            {
                CodecEntry {
                    formatter: None,
                    validator: Validator::UnicodePassword,
                }
            } else {
                CodecEntry {
                    formatter: Some(Formatter::Unicode),
                    validator: Validator::AlwaysValid,
                }
            };
        }

        let (formatter, validator) = syntax_default(&attr.syntax);
        let (formatter_override, validator_override) = attribute_override(&attr.oid);
        CodecEntry {
            formatter: Some(formatter_override.unwrap_or(formatter)),
            validator: validator_override.unwrap_or(validator),
        }
    }

    pub fn formatter_for(&self, name: &str) -> Option<Formatter> {
        self.resolve(name).formatter
    }

    pub fn validator_for(&self, name: &str) -> Validator {
        self.resolve(name).validator
    }

    /// Formats raw values; single-valued attributes collapse to a scalar.
    /// Returns `None` for write-only attributes.
    pub fn format(&self, name: &str, raw_values: &[WireValue]) -> Option<Value> {
        let formatter = self.formatter_for(name)?;
        let mut formatted: Vec<Value> = raw_values.iter().map(|raw| formatter.format(raw)).collect();

        if formatted.is_empty() {
            return Some(Value::Array(Vec::new()));
        }
        if self.schema.is_single_valued(name) {
            return Some(formatted.swap_remove(0));
        }
        Some(Value::Array(formatted))
    }

    pub fn validate(&self, name: &str, external: &Value) -> Validated {
        let values = as_value_list(external);
        if self.schema.is_single_valued(name) && values.len() > 1 {
            return Validated::Invalid;
        }
        self.validator_for(name).validate(&values)
    }

    /// Validated wire values for one attribute, or `None` when invalid.
    pub fn to_wire(&self, name: &str, external: &Value) -> Option<Vec<WireValue>> {
        match self.validate(name, external) {
            Validated::Unchanged => as_value_list(external)
                .iter()
                .map(|v| external_to_text(v).map(String::into_bytes))
                .collect(),
            Validated::Replaced(wire) => Some(wire),
            Validated::Invalid => None,
        }
    }
}
