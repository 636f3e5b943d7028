pub mod parser;

pub use parser::{load_schema_file, parse_schema_str, BUILTIN_SCHEMA};

use std::collections::HashMap;

/// Syntax OIDs the codec table distinguishes.
pub mod syntax {
    pub const BINARY: &str = "1.3.6.1.4.1.1466.115.121.1.5";
    pub const BOOLEAN: &str = "1.3.6.1.4.1.1466.115.121.1.7";
    pub const DN: &str = "1.3.6.1.4.1.1466.115.121.1.12";
    pub const DIRECTORY_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.15";
    pub const GENERALIZED_TIME: &str = "1.3.6.1.4.1.1466.115.121.1.24";
    pub const INTEGER: &str = "1.3.6.1.4.1.1466.115.121.1.27";
    pub const OID: &str = "1.3.6.1.4.1.1466.115.121.1.38";
    pub const OCTET_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.40";
    pub const UTC_TIME: &str = "1.3.6.1.4.1.1466.115.121.1.53";
    pub const NOVELL_TIME: &str = "2.16.840.1.113719.1.1.5.1.19";
    pub const DN_BINARY: &str = "1.2.840.113556.1.4.903";
    pub const LARGE_INTEGER: &str = "1.2.840.113556.1.4.906";
    pub const SECURITY_DESCRIPTOR: &str = "1.2.840.113556.1.4.907";
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub oid: String,
    /// Canonical name first, then aliases.
    pub names: Vec<String>,
    pub syntax: String,
    pub single_value: bool,
}

impl AttributeDescriptor {
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }
}

/// Attribute types keyed by every lower-cased name, alias and OID.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    attributes: Vec<AttributeDescriptor>,
    index: HashMap<String, usize>,
    fallback: AttributeDescriptor,
}

impl SchemaRegistry {
    pub fn new(attributes: Vec<AttributeDescriptor>) -> Self {
        let mut registry = Self {
            attributes: Vec::new(),
            index: HashMap::new(),
            fallback: AttributeDescriptor {
                oid: String::new(),
                names: Vec::new(),
                syntax: syntax::DIRECTORY_STRING.to_string(),
                single_value: false,
            },
        };
        registry.extend(attributes);
        registry
    }

    /// Registry loaded from the embedded AD schema.
    pub fn builtin() -> crate::Result<Self> {
        Ok(Self::new(parse_schema_str(BUILTIN_SCHEMA)?))
    }

    /// Adds descriptors; a later descriptor replaces any earlier one that
    /// shares its OID or one of its names.
    pub fn extend(&mut self, attributes: Vec<AttributeDescriptor>) {
        for attr in attributes {
            let slot = std::iter::once(&attr.oid)
                .chain(attr.names.iter())
                .find_map(|key| self.index.get(&key.to_lowercase()).copied());

            let position = match slot {
                Some(position) => {
                    let replaced = std::mem::replace(&mut self.attributes[position], attr);
                    for key in std::iter::once(&replaced.oid).chain(replaced.names.iter()) {
                        self.index.remove(&key.to_lowercase());
                    }
                    position
                }
                None => {
                    self.attributes.push(attr);
                    self.attributes.len() - 1
                }
            };

            let attr = &self.attributes[position];
            for key in std::iter::once(&attr.oid).chain(attr.names.iter()) {
                self.index.insert(key.to_lowercase(), position);
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.index
            .get(&name.to_lowercase())
            .map(|&position| &self.attributes[position])
    }

    /// Like `lookup`, but unknown names get a multi-valued string descriptor.
    pub fn descriptor(&self, name: &str) -> &AttributeDescriptor {
        self.lookup(name).unwrap_or(&self.fallback)
    }

    pub fn is_single_valued(&self, name: &str) -> bool {
        self.descriptor(name).single_value
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(oid: &str, names: &[&str], single_value: bool) -> AttributeDescriptor {
        AttributeDescriptor {
            oid: oid.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            syntax: syntax::DIRECTORY_STRING.to_string(),
            single_value,
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = SchemaRegistry::builtin().unwrap();
        let attr = registry.lookup("ACCOUNTEXPIRES").unwrap();
        assert_eq!(attr.oid, "1.2.840.113556.1.4.159");
        assert_eq!(attr.name(), "accountExpires");
        assert!(registry.lookup("accountexpires").is_some());
    }

    #[test]
    fn test_lookup_by_alias_and_oid() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert_eq!(registry.lookup("commonName").unwrap().name(), "cn");
        assert_eq!(registry.lookup("2.5.4.3").unwrap().name(), "cn");
    }

    #[test]
    fn test_unknown_attribute_falls_back() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert!(registry.lookup("msDS-SomethingNew").is_none());

        let attr = registry.descriptor("msDS-SomethingNew");
        assert_eq!(attr.syntax, syntax::DIRECTORY_STRING);
        assert!(!attr.single_value);
        assert!(!registry.is_single_valued("msDS-SomethingNew"));
    }

    #[test]
    fn test_single_valued_flags() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert!(registry.is_single_valued("cn"));
        assert!(registry.is_single_valued("mail"));
        assert!(!registry.is_single_valued("member"));
        assert!(!registry.is_single_valued("objectClass"));
    }

    #[test]
    fn test_extend_replaces_by_name() {
        let mut registry = SchemaRegistry::new(vec![descriptor("1.1", &["foo", "fooAlias"], false)]);
        registry.extend(vec![descriptor("1.2", &["foo"], true)]);

        assert_eq!(registry.len(), 1);
        assert!(registry.is_single_valued("foo"));
        assert_eq!(registry.lookup("foo").unwrap().oid, "1.2");
        assert!(registry.lookup("fooAlias").is_none());
        assert!(registry.lookup("1.1").is_none());
    }

    #[test]
    fn test_extend_appends_new() {
        let mut registry = SchemaRegistry::new(vec![descriptor("1.1", &["foo"], false)]);
        registry.extend(vec![descriptor("1.2", &["bar"], true)]);
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("BAR").is_some());
    }
}
