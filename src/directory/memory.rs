//! In-process directory seeded from YAML, used by the sandbox mode and the
//! test suite.

use super::filter::parse_filter;
use super::{
    child_dn, normalize_dn, parent_dn, split_rdn, unescape_dn_value, DirectoryConnector,
    DirectoryEntry, DirectoryError, DirectoryErrorKind, DirectoryResult, DirectorySession,
    ModifyOperation, SearchScope, WireAttributes,
};
use crate::codec::WireValue;
use crate::profiles::ConnectionProfile;
use crate::AdRestError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use dashmap::DashMap;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const NOT_ALLOWED_ON_NON_LEAF: u32 = 66;

#[derive(Debug, Deserialize)]
pub struct SeedDocument {
    pub directory: SeedDirectory,
    #[serde(default)]
    pub entries: Vec<SeedEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SeedDirectory {
    pub base_dn: String,
}

/// One seeded object. Attribute values are scalars or lists of scalars;
/// binary values are written as `{base64: "..."}`.
#[derive(Debug, Deserialize)]
pub struct SeedEntry {
    pub dn: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, YamlValue>,
}

fn seed_value(value: &YamlValue) -> crate::Result<Vec<WireValue>> {
    match value {
        YamlValue::Sequence(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.extend(seed_value(item)?);
            }
            Ok(values)
        }
        YamlValue::String(s) => Ok(vec![s.as_bytes().to_vec()]),
        YamlValue::Number(n) => Ok(vec![n.to_string().into_bytes()]),
        YamlValue::Bool(true) => Ok(vec![b"TRUE".to_vec()]),
        YamlValue::Bool(false) => Ok(vec![b"FALSE".to_vec()]),
        YamlValue::Mapping(map) => {
            let encoded = map
                .get("base64")
                .and_then(YamlValue::as_str)
                .ok_or_else(|| AdRestError::Config("binary seed values need a base64 key".to_string()))?;
            let raw = BASE64
                .decode(encoded)
                .map_err(|e| AdRestError::Config(format!("invalid base64 seed value: {}", e)))?;
            Ok(vec![raw])
        }
        YamlValue::Null => Ok(Vec::new()),
        YamlValue::Tagged(tagged) => seed_value(&tagged.value),
    }
}

impl SeedEntry {
    fn into_entry(self) -> crate::Result<DirectoryEntry> {
        let mut attributes = WireAttributes::new();
        for (name, value) in &self.attributes {
            attributes.extend_values(name, seed_value(value)?);
        }
        Ok(DirectoryEntry::new(self.dn, attributes))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    base_dn: String,
    entries: Arc<DashMap<String, DirectoryEntry>>,
}

impl MemoryConnector {
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn from_yaml_str(content: &str) -> crate::Result<Self> {
        let document: SeedDocument = serde_yaml::from_str(content)?;
        let connector = Self::new(document.directory.base_dn);
        for seed in document.entries {
            connector.insert(seed.into_entry()?);
        }
        Ok(connector)
    }

    pub async fn load_file(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let connector = Self::from_yaml_str(&content)?;
        info!(
            "Loaded {} sandbox entries under {} from {:?}",
            connector.len(),
            connector.base_dn,
            path
        );
        Ok(connector)
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    pub fn insert(&self, entry: DirectoryEntry) {
        self.entries.insert(normalize_dn(&entry.dn), entry);
    }

    pub fn get(&self, dn: &str) -> Option<DirectoryEntry> {
        self.entries.get(&normalize_dn(dn)).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DirectoryConnector for MemoryConnector {
    async fn open(&self, profile: &ConnectionProfile) -> crate::Result<Box<dyn DirectorySession>> {
        debug!("Opening sandbox session for profile {}", profile.name);
        Ok(Box::new(MemorySession {
            entries: Arc::clone(&self.entries),
        }))
    }
}

pub struct MemorySession {
    entries: Arc<DashMap<String, DirectoryEntry>>,
}

fn in_scope(entry_dn: &str, base_dn: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => entry_dn == base_dn,
        SearchScope::OneLevel => entry_dn != base_dn && parent_dn(entry_dn) == base_dn,
        SearchScope::Subtree => {
            base_dn.is_empty()
                || entry_dn == base_dn
                || entry_dn.ends_with(&format!(",{}", base_dn))
        }
    }
}

fn project(entry: &DirectoryEntry, attributes: Option<&[String]>) -> DirectoryEntry {
    let names = match attributes {
        Some(names) if !names.iter().any(|n| n == "*") => names,
        _ => return entry.clone(),
    };

    let mut projected = WireAttributes::new();
    for (name, values) in entry.attributes.iter() {
        if names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            projected.insert(name, values.clone());
        }
    }
    DirectoryEntry::new(entry.dn.clone(), projected)
}

/// Number of RDN components in a normalized DN.
fn depth(dn: &str) -> usize {
    let mut count = 0;
    let mut rest = dn;
    while !rest.is_empty() {
        count += 1;
        rest = split_rdn(rest).1;
    }
    count
}

impl MemorySession {
    fn require(&self, dn: &str) -> DirectoryResult<String> {
        let key = normalize_dn(dn);
        if self.entries.contains_key(&key) {
            Ok(key)
        } else {
            Err(DirectoryError::no_such_object(dn))
        }
    }

    fn has_children(&self, key: &str) -> bool {
        let suffix = format!(",{}", key);
        self.entries.iter().any(|e| e.key().ends_with(&suffix))
    }
}

#[async_trait]
impl DirectorySession for MemorySession {
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: Option<&[String]>,
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let filter = parse_filter(filter)?;
        let base_key = self.require(base)?;

        let mut matched: Vec<(String, DirectoryEntry)> = self
            .entries
            .iter()
            .filter(|e| in_scope(e.key(), &base_key, scope) && filter.matches(e.value()))
            .map(|e| (e.key().clone(), project(e.value(), attributes)))
            .collect();
        matched.sort_by(|a, b| depth(&a.0).cmp(&depth(&b.0)).then_with(|| a.0.cmp(&b.0)));

        Ok(matched.into_iter().map(|(_, entry)| entry).collect())
    }

    async fn add(&mut self, dn: &str, attributes: &WireAttributes) -> DirectoryResult<()> {
        let key = normalize_dn(dn);
        if key.is_empty() || !key.contains('=') {
            return Err(DirectoryError::new(
                DirectoryErrorKind::InvalidDnSyntax,
                format!("Invalid DN syntax: {}", dn),
            ));
        }
        if self.entries.contains_key(&key) {
            return Err(DirectoryError::new(
                DirectoryErrorKind::AlreadyExists,
                format!("Entry already exists: {}", dn),
            ));
        }
        let parent = parent_dn(&key);
        if !parent.is_empty() && !self.entries.contains_key(parent) {
            return Err(DirectoryError::no_such_object(parent_dn(dn)));
        }
        if !attributes.contains("objectClass") {
            return Err(DirectoryError::new(
                DirectoryErrorKind::ObjectClassViolation,
                format!("No objectClass given for {}", dn),
            ));
        }

        self.entries
            .insert(key, DirectoryEntry::new(dn, attributes.clone()));
        Ok(())
    }

    async fn modify(&mut self, dn: &str, operations: &[ModifyOperation]) -> DirectoryResult<()> {
        let key = self.require(dn)?;
        let mut entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| DirectoryError::no_such_object(dn))?;

        // Apply to a copy so a failing operation leaves the entry untouched.
        let mut attributes = entry.attributes.clone();
        for operation in operations {
            match operation {
                ModifyOperation::Add(name, values) => {
                    attributes.extend_values(name, values.clone());
                }
                ModifyOperation::Replace(name, values) if values.is_empty() => {
                    attributes.remove(name);
                }
                ModifyOperation::Replace(name, values) => {
                    attributes.insert(name.clone(), values.clone());
                }
                ModifyOperation::Delete(name) => {
                    if attributes.remove(name).is_none() {
                        return Err(DirectoryError::new(
                            DirectoryErrorKind::Other(16),
                            format!("No such attribute: {}", name),
                        ));
                    }
                }
            }
        }
        if !attributes.contains("objectClass") {
            return Err(DirectoryError::new(
                DirectoryErrorKind::ObjectClassViolation,
                format!("objectClass cannot be removed from {}", dn),
            ));
        }

        entry.attributes = attributes;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        let key = self.require(dn)?;
        if self.has_children(&key) {
            return Err(DirectoryError::new(
                DirectoryErrorKind::Other(NOT_ALLOWED_ON_NON_LEAF),
                format!("Entry has children: {}", dn),
            ));
        }
        self.entries.remove(&key);
        Ok(())
    }

    async fn rename(&mut self, dn: &str, new_rdn: &str) -> DirectoryResult<()> {
        let key = self.require(dn)?;
        let (_, parent) = split_rdn(dn);
        let new_dn = child_dn(new_rdn.trim(), parent);
        let new_key = normalize_dn(&new_dn);

        let (attr, raw_value) = new_rdn.split_once('=').ok_or_else(|| {
            DirectoryError::new(
                DirectoryErrorKind::InvalidDnSyntax,
                format!("Invalid RDN: {}", new_rdn),
            )
        })?;
        if new_key != key && self.entries.contains_key(&new_key) {
            return Err(DirectoryError::new(
                DirectoryErrorKind::AlreadyExists,
                format!("Entry already exists: {}", new_dn),
            ));
        }

        let (_, mut entry) = self
            .entries
            .remove(&key)
            .ok_or_else(|| DirectoryError::no_such_object(dn))?;
        let value = unescape_dn_value(raw_value.trim());
        entry.attributes.insert(attr.trim(), vec![value.into_bytes()]);
        entry.dn = new_dn.clone();
        self.entries.insert(new_key.clone(), entry);

        // Move the subtree along with its root.
        let suffix = format!(",{}", key);
        let moved: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().ends_with(&suffix))
            .map(|e| e.key().clone())
            .collect();
        let levels = depth(&key);
        for child_key in moved {
            if let Some((_, mut child)) = self.entries.remove(&child_key) {
                let mut components = Vec::new();
                let mut rest = child.dn.as_str();
                for _ in 0..depth(&child_key).saturating_sub(levels) {
                    let (rdn, parent) = split_rdn(rest);
                    components.push(rdn.to_string());
                    rest = parent;
                }
                components.push(new_dn.clone());
                child.dn = components.join(",");
                self.entries.insert(normalize_dn(&child.dn), child);
            }
        }

        Ok(())
    }

    async fn close(&mut self) -> DirectoryResult<()> {
        Ok(())
    }
}
