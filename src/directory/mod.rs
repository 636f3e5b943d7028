pub mod filter;
pub mod kerberos;
pub mod ldap;
pub mod memory;

pub use kerberos::TicketCache;
pub use ldap::LdapConnector;
pub use memory::MemoryConnector;

use crate::codec::WireValue;
use crate::profiles::ConnectionProfile;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Attribute map keyed case-insensitively. The spelling of the most recent
/// insert is kept for output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireAttributes {
    entries: BTreeMap<String, (String, Vec<WireValue>)>,
}

impl WireAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map, failing with the offending name if two keys differ
    /// only by case.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (String, Vec<WireValue>)>,
    {
        let mut attrs = Self::new();
        for (name, values) in pairs {
            if attrs.contains(&name) {
                return Err(name);
            }
            attrs.insert(name, values);
        }
        Ok(attrs)
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<WireValue>) {
        let name = name.into();
        self.entries.insert(name.to_lowercase(), (name, values));
    }

    pub fn get(&self, name: &str) -> Option<&Vec<WireValue>> {
        self.entries.get(&name.to_lowercase()).map(|(_, values)| values)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<WireValue>> {
        self.entries.remove(&name.to_lowercase()).map(|(_, values)| values)
    }

    /// Appends values to an attribute, creating it if needed.
    pub fn extend_values(&mut self, name: &str, values: Vec<WireValue>) {
        match self.entries.get_mut(&name.to_lowercase()) {
            Some((_, existing)) => existing.extend(values),
            None => self.insert(name, values),
        }
    }

    /// Original attribute names, ordered by their lower-cased form.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Vec<WireValue>)> {
        self.entries.values().map(|(name, values)| (name.as_str(), values))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for WireAttributes {
    type Item = (String, Vec<WireValue>);
    type IntoIter = std::collections::btree_map::IntoValues<String, (String, Vec<WireValue>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: WireAttributes,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>, attributes: WireAttributes) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModifyOperation {
    Add(String, Vec<WireValue>),
    Replace(String, Vec<WireValue>),
    Delete(String),
}

impl ModifyOperation {
    pub fn attribute(&self) -> &str {
        match self {
            ModifyOperation::Add(name, _)
            | ModifyOperation::Replace(name, _)
            | ModifyOperation::Delete(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    Base,
    OneLevel,
    #[default]
    Subtree,
}

impl SearchScope {
    /// Parses the `scope` query parameter; anything unrecognized is a
    /// subtree search.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("base") => SearchScope::Base,
            Some("one") => SearchScope::OneLevel,
            _ => SearchScope::Subtree,
        }
    }
}

pub const DEFAULT_FILTER: &str = "(objectClass=*)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryErrorKind {
    NoSuchObject,
    InvalidDnSyntax,
    FilterError,
    ObjectClassViolation,
    AlreadyExists,
    InvalidAttributeSyntax,
    Other(u32),
}

impl DirectoryErrorKind {
    pub fn from_result_code(rc: u32) -> Self {
        match rc {
            21 => DirectoryErrorKind::InvalidAttributeSyntax,
            32 => DirectoryErrorKind::NoSuchObject,
            34 => DirectoryErrorKind::InvalidDnSyntax,
            65 => DirectoryErrorKind::ObjectClassViolation,
            68 => DirectoryErrorKind::AlreadyExists,
            87 => DirectoryErrorKind::FilterError,
            other => DirectoryErrorKind::Other(other),
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self, DirectoryErrorKind::Other(_))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DirectoryError {
    pub kind: DirectoryErrorKind,
    pub message: String,
}

impl DirectoryError {
    pub fn new(kind: DirectoryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_such_object(dn: &str) -> Self {
        Self::new(DirectoryErrorKind::NoSuchObject, format!("No such object: {}", dn))
    }
}

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Opens a bound session for one request.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn open(&self, profile: &ConnectionProfile) -> crate::Result<Box<dyn DirectorySession>>;
}

/// One bound directory session. `attributes: None` requests every
/// attribute; an empty slice requests none.
#[async_trait]
pub trait DirectorySession: Send {
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: Option<&[String]>,
    ) -> DirectoryResult<Vec<DirectoryEntry>>;

    async fn add(&mut self, dn: &str, attributes: &WireAttributes) -> DirectoryResult<()>;

    async fn modify(&mut self, dn: &str, operations: &[ModifyOperation]) -> DirectoryResult<()>;

    async fn delete(&mut self, dn: &str) -> DirectoryResult<()>;

    /// Renames `dn` to `new_rdn` under the same parent, dropping the old
    /// RDN value.
    async fn rename(&mut self, dn: &str, new_rdn: &str) -> DirectoryResult<()>;

    async fn close(&mut self) -> DirectoryResult<()>;
}

/// Splits a DN into its leftmost RDN and the parent DN, honoring `\`
/// escapes.
pub fn split_rdn(dn: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => return (dn[..i].trim(), dn[i + 1..].trim()),
            _ => escaped = false,
        }
    }
    (dn.trim(), "")
}

/// Attribute name of the leftmost RDN, e.g. `cn` for `cn=A,ou=Users`.
pub fn rdn_attribute(dn: &str) -> Option<&str> {
    let (rdn, _) = split_rdn(dn);
    rdn.split_once('=')
        .map(|(attr, _)| attr.trim())
        .filter(|attr| !attr.is_empty())
}

pub fn parent_dn(dn: &str) -> &str {
    split_rdn(dn).1
}

/// Joins an RDN onto a parent DN.
pub fn child_dn(rdn: &str, parent: &str) -> String {
    if parent.is_empty() {
        rdn.to_string()
    } else {
        format!("{},{}", rdn, parent)
    }
}

/// Reverses RFC 4514 value escaping (`\,` and `\2C` forms).
pub fn unescape_dn_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let hex = value
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            match hex {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                }
                None => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Lower-cased DN with whitespace around separators removed, for
/// comparisons.
pub fn normalize_dn(dn: &str) -> String {
    let mut parts = Vec::new();
    let mut rest = dn;
    while !rest.is_empty() {
        let (rdn, parent) = split_rdn(rest);
        let rdn = match rdn.split_once('=') {
            Some((attr, value)) => format!("{}={}", attr.trim(), value.trim()),
            None => rdn.to_string(),
        };
        parts.push(rdn.to_lowercase());
        rest = parent;
    }
    parts.join(",")
}
