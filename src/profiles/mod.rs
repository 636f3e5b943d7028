//! Named LDAP connection profiles.
//!
//! Profiles live in memory and, when the store was opened with a file,
//! are rewritten to that YAML file after every mutation.

use crate::transcode::RequestError;
use crate::AdRestError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const MASKED_PASSWORD: &str = "******";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMechanism {
    Simple,
    #[default]
    Gssapi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub name: String,
    pub ldap_url: String,
    pub credentials: Credentials,
    #[serde(default)]
    pub bind_mechanism: BindMechanism,
}

impl ConnectionProfile {
    /// Copy safe to return to callers.
    pub fn masked(&self) -> ConnectionProfile {
        let mut profile = self.clone();
        profile.credentials.password = MASKED_PASSWORD.to_string();
        profile
    }
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsPatch {
    user: Option<String>,
    password: Option<String>,
}

/// A request body where every field may be absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfilePatch {
    name: Option<String>,
    ldap_url: Option<String>,
    credentials: Option<CredentialsPatch>,
    bind_mechanism: Option<BindMechanism>,
}

const LDAP_SCHEMES: [&str; 3] = ["ldap", "ldaps", "ldapi"];

fn check_ldap_url(ldap_url: &str) -> crate::Result<()> {
    let parsed = url::Url::parse(ldap_url)
        .map_err(|e| RequestError::InvalidBody(format!("ldapUrl {}: {}", ldap_url, e)))?;
    if !LDAP_SCHEMES.contains(&parsed.scheme()) {
        return Err(RequestError::InvalidBody(format!(
            "ldapUrl scheme must be one of {}",
            LDAP_SCHEMES.join(", ")
        ))
        .into());
    }
    Ok(())
}

impl ProfilePatch {
    fn from_body(body: Value) -> crate::Result<Self> {
        if !body.is_object() {
            return Err(RequestError::NotAMapping.into());
        }
        let patch: ProfilePatch = serde_json::from_value(body)
            .map_err(|e| RequestError::InvalidBody(e.to_string()))?;
        if let Some(ldap_url) = &patch.ldap_url {
            check_ldap_url(ldap_url)?;
        }
        Ok(patch)
    }

    fn missing_fields(&self) -> Vec<String> {
        let credentials = self.credentials.as_ref();
        [
            ("name", self.name.is_none()),
            ("ldapUrl", self.ldap_url.is_none()),
            ("credentials.user", credentials.map_or(true, |c| c.user.is_none())),
            ("credentials.password", credentials.map_or(true, |c| c.password.is_none())),
        ]
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(field, _)| field.to_string())
        .collect()
    }

    fn into_profile(self) -> crate::Result<ConnectionProfile> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(AdRestError::MissingAttribute(missing));
        }
        let credentials = self.credentials.unwrap_or_default();
        Ok(ConnectionProfile {
            name: self.name.unwrap_or_default(),
            ldap_url: self.ldap_url.unwrap_or_default(),
            credentials: Credentials {
                user: credentials.user.unwrap_or_default(),
                password: credentials.password.unwrap_or_default(),
            },
            bind_mechanism: self.bind_mechanism.unwrap_or_default(),
        })
    }

    fn apply_to(self, profile: &mut ConnectionProfile) {
        if let Some(ldap_url) = self.ldap_url {
            profile.ldap_url = ldap_url;
        }
        if let Some(credentials) = self.credentials {
            if let Some(user) = credentials.user {
                profile.credentials.user = user;
            }
            if let Some(password) = credentials.password {
                profile.credentials.password = password;
            }
        }
        if let Some(mechanism) = self.bind_mechanism {
            profile.bind_mechanism = mechanism;
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileDocument {
    #[serde(default)]
    connections: Vec<ConnectionProfile>,
}

#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: DashMap<String, ConnectionProfile>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl ProfileStore {
    /// In-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a YAML file. A missing file starts empty and is
    /// created on the first mutation.
    pub async fn open(path: &Path) -> crate::Result<Self> {
        let store = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path).await?;
            let document: ProfileDocument = serde_yaml::from_str(&content)?;
            for profile in document.connections {
                store.profiles.insert(profile.name.clone(), profile);
            }
            info!("Loaded {} connection profile(s) from {:?}", store.profiles.len(), path);
        }

        Ok(store)
    }

    pub fn list(&self) -> Vec<ConnectionProfile> {
        let mut profiles: Vec<_> = self.profiles.iter().map(|p| p.value().clone()).collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    pub fn get(&self, name: &str) -> crate::Result<ConnectionProfile> {
        self.profiles
            .get(name)
            .map(|p| p.value().clone())
            .ok_or_else(|| AdRestError::ProfileNotFound(name.to_string()))
    }

    pub async fn create(&self, body: Value) -> crate::Result<ConnectionProfile> {
        let profile = ProfilePatch::from_body(body)?.into_profile()?;

        match self.profiles.entry(profile.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AdRestError::ProfileExists(profile.name));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(profile.clone());
            }
        }

        debug!("Created connection profile {}", profile.name);
        self.persist().await?;
        Ok(profile)
    }

    pub async fn delete(&self, name: &str) -> crate::Result<()> {
        self.profiles
            .remove(name)
            .ok_or_else(|| AdRestError::ProfileNotFound(name.to_string()))?;
        debug!("Deleted connection profile {}", name);
        self.persist().await
    }

    /// Full updates need every field; partial updates merge what is given.
    pub async fn update(&self, name: &str, body: Value, partial: bool) -> crate::Result<ConnectionProfile> {
        let patch = ProfilePatch::from_body(body)?;
        if let Some(body_name) = patch.name.as_deref() {
            if body_name != name {
                return Err(AdRestError::ProfileMismatch(body_name.to_string()));
            }
        }

        let updated = {
            let mut current = self
                .profiles
                .get_mut(name)
                .ok_or_else(|| AdRestError::ProfileNotFound(name.to_string()))?;

            if partial {
                patch.apply_to(current.value_mut());
            } else {
                *current.value_mut() = patch.into_profile()?;
            }
            current.value().clone()
        };

        debug!("Updated connection profile {}", name);
        self.persist().await?;
        Ok(updated)
    }

    async fn persist(&self) -> crate::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let document = ProfileDocument {
            connections: self.list(),
        };
        let content = serde_yaml::to_string(&document)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
