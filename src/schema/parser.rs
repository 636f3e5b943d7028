use super::AttributeDescriptor;
use crate::AdRestError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Attribute types shipped with the binary.
pub const BUILTIN_SCHEMA: &str = include_str!("ad_schema.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub attributes: Vec<AttributeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDef {
    pub oid: String,
    pub names: Vec<String>,
    pub syntax: String,
    #[serde(default)]
    pub single_value: bool,
}

impl From<AttributeDef> for AttributeDescriptor {
    fn from(def: AttributeDef) -> Self {
        AttributeDescriptor {
            oid: def.oid,
            names: def.names,
            syntax: def.syntax,
            single_value: def.single_value,
        }
    }
}

pub fn parse_schema_str(content: &str) -> crate::Result<Vec<AttributeDescriptor>> {
    let document: SchemaDocument = serde_yaml::from_str(content)?;
    validate_definitions(&document.attributes)?;
    Ok(document.attributes.into_iter().map(Into::into).collect())
}

pub async fn load_schema_file(path: &Path) -> crate::Result<Vec<AttributeDescriptor>> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_schema_str(&content)
}

fn validate_definitions(defs: &[AttributeDef]) -> crate::Result<()> {
    for def in defs {
        if def.oid.is_empty() {
            return Err(AdRestError::Config(
                "Attribute definition OID cannot be empty".to_string(),
            ));
        }

        if def.names.is_empty() || def.names.iter().any(|n| n.is_empty()) {
            return Err(AdRestError::Config(format!(
                "Attribute {} must have at least one non-empty name",
                def.oid
            )));
        }

        if def.syntax.is_empty() {
            return Err(AdRestError::Config(format!(
                "Attribute {} is missing a syntax OID",
                def.oid
            )));
        }
    }

    Ok(())
}
