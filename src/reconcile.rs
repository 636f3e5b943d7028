//! Turns an old entry and a set of new attributes into a rename plus the
//! smallest modify request that makes them agree.

use crate::codec::{CodecTable, WireValue};
use crate::directory::{child_dn, parent_dn, rdn_attribute, ModifyOperation, WireAttributes};
use crate::transcode::ValidatedAttributes;
use crate::AdRestError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// PATCH: attributes absent from the request are left alone.
    Partial,
    /// PUT: attributes absent from the request are deleted.
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rename {
    pub dn: String,
    pub new_rdn: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub rename: Option<Rename>,
    /// DN the modifications apply to, after any rename.
    pub target_dn: String,
    pub modifications: Vec<ModifyOperation>,
}

impl UpdatePlan {
    pub fn is_noop(&self) -> bool {
        self.rename.is_none() && self.modifications.is_empty()
    }
}

fn same_values(a: &[WireValue], b: &[WireValue]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Text of a formatted naming value, for building an RDN.
fn rdn_text(formatted: &Value) -> Option<String> {
    let scalar = match formatted {
        Value::Array(values) => values.first()?,
        other => other,
    };
    match scalar {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub fn reconcile(
    codecs: &CodecTable,
    dn: &str,
    old: &WireAttributes,
    new: ValidatedAttributes,
    mode: UpdateMode,
) -> crate::Result<UpdatePlan> {
    let mut new = WireAttributes::from_pairs(new).map_err(AdRestError::AmbiguousAttributeKey)?;
    let mut old = old.clone();
    let mut target_dn = dn.to_string();
    let mut rename = None;

    if let Some(naming) = rdn_attribute(dn) {
        let renamed_value = match (old.get(naming), new.get(naming)) {
            (Some(old_values), Some(new_values)) => {
                let new_formatted = codecs.format(naming, new_values);
                (codecs.format(naming, old_values) != new_formatted).then_some(new_formatted)
            }
            _ => None,
        };

        if let Some(new_formatted) = renamed_value {
            let value = new_formatted
                .as_ref()
                .and_then(rdn_text)
                .ok_or_else(|| AdRestError::MissingAttribute(vec![naming.to_string()]))?;
            let new_rdn = format!("{}={}", naming, ldap3::dn_escape(value.as_str()));
            target_dn = child_dn(&new_rdn, parent_dn(dn));
            rename = Some(Rename {
                dn: dn.to_string(),
                new_rdn,
            });

            old.remove(naming);
            new.remove(naming);
        }
    }

    let keys: Vec<String> = match mode {
        UpdateMode::Partial => new.names().map(str::to_string).collect(),
        UpdateMode::Full => old
            .names()
            .chain(new.names().filter(|name| !old.contains(name)))
            .map(str::to_string)
            .collect(),
    };

    let mut modifications = Vec::new();
    for key in keys {
        match (old.get(&key), new.get(&key)) {
            (Some(_), None) if mode == UpdateMode::Full => {
                modifications.push(ModifyOperation::Delete(key));
            }
            (Some(old_values), Some(new_values)) if same_values(old_values, new_values) => {}
            (_, Some(new_values)) => {
                modifications.push(ModifyOperation::Replace(key, new_values.clone()));
            }
            (_, None) => {}
        }
    }

    Ok(UpdatePlan {
        rename,
        target_dn,
        modifications,
    })
}
