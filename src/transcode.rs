//! Request bodies in, directory entries out.

use crate::codec::{CodecTable, WireValue};
use crate::directory::DirectoryEntry;
use crate::AdRestError;
use serde::Serialize;
use serde_json::{Map, Value};

pub const KEY_ATTRIBUTES: &str = "attributes";

/// Malformed request bodies, as opposed to invalid attribute values.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("dictionary expected")]
    NotAMapping,

    #[error("key expected: {0}")]
    MissingKey(String),

    #[error("unexpected key(s): {}", .0.join(", "))]
    UnexpectedKeys(Vec<String>),

    #[error("{0} must be a dictionary")]
    AttributesNotAMapping(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),
}

/// Validated attributes in request order.
pub type ValidatedAttributes = Vec<(String, Vec<WireValue>)>;

/// JSON view of one directory entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalEntry {
    pub dn: String,
    pub attributes: Map<String, Value>,
}

/// Checks the body shape and returns the `attributes` mapping.
pub fn request_attributes(body: &Value) -> Result<&Map<String, Value>, RequestError> {
    let object = body.as_object().ok_or(RequestError::NotAMapping)?;

    let attributes = object
        .get(KEY_ATTRIBUTES)
        .ok_or_else(|| RequestError::MissingKey(KEY_ATTRIBUTES.to_string()))?;

    let unexpected: Vec<String> = object
        .keys()
        .filter(|k| k.as_str() != KEY_ATTRIBUTES)
        .cloned()
        .collect();
    if !unexpected.is_empty() {
        return Err(RequestError::UnexpectedKeys(unexpected));
    }

    attributes
        .as_object()
        .ok_or_else(|| RequestError::AttributesNotAMapping(KEY_ATTRIBUTES.to_string()))
}

/// Unwraps `{"attributes": {...}}` and validates every attribute.
pub fn decode_request(codecs: &CodecTable, body: &Value) -> crate::Result<ValidatedAttributes> {
    decode_attributes(codecs, request_attributes(body)?)
}

/// Validates each attribute; every invalid name is reported together.
pub fn decode_attributes(
    codecs: &CodecTable,
    attributes: &Map<String, Value>,
) -> crate::Result<ValidatedAttributes> {
    let mut valid = Vec::with_capacity(attributes.len());
    let mut invalid = Vec::new();

    for (name, value) in attributes {
        match codecs.to_wire(name, value) {
            Some(wire) => valid.push((name.clone(), wire)),
            None => invalid.push(name.clone()),
        }
    }

    if invalid.is_empty() {
        Ok(valid)
    } else {
        Err(AdRestError::Validation(invalid))
    }
}

/// Formats every attribute of an entry. Write-only attributes are dropped.
pub fn encode_entry(codecs: &CodecTable, entry: &DirectoryEntry) -> ExternalEntry {
    let attributes = entry
        .attributes
        .iter()
        .filter_map(|(name, values)| {
            codecs
                .format(name, values)
                .map(|value| (name.to_string(), value))
        })
        .collect();

    ExternalEntry {
        dn: entry.dn.clone(),
        attributes,
    }
}
