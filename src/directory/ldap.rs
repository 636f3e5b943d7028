//! Directory sessions over a live LDAP server.

use super::{
    DirectoryConnector, DirectoryEntry, DirectoryError, DirectoryErrorKind, DirectoryResult,
    DirectorySession, ModifyOperation, SearchScope, TicketCache, WireAttributes,
};
use crate::codec::WireValue;
use crate::profiles::{BindMechanism, ConnectionProfile};
use crate::AdRestError;
use async_trait::async_trait;
use ldap3::result::LdapError;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Requests no attributes in a search.
const NO_ATTRIBUTES: &str = "1.1";
const LDAP_OTHER: u32 = 80;

pub struct LdapConnector {
    connect_timeout: Duration,
    #[cfg_attr(not(feature = "gssapi"), allow(dead_code))]
    tickets: Arc<TicketCache>,
}

impl LdapConnector {
    pub fn new(connect_timeout: Duration, tickets: Arc<TicketCache>) -> Self {
        Self {
            connect_timeout,
            tickets,
        }
    }

    async fn connect(&self, url: &str) -> crate::Result<Ldap> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.connect_timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, url)
            .await
            .map_err(|e| AdRestError::Bind(format!("failed to connect to {}: {}", url, e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection driver error: {}", e);
            }
        });

        Ok(ldap)
    }

    async fn bind(&self, ldap: &mut Ldap, profile: &ConnectionProfile) -> crate::Result<()> {
        let credentials = &profile.credentials;
        let result = match profile.bind_mechanism {
            BindMechanism::Simple => ldap
                .simple_bind(&credentials.user, &credentials.password)
                .await
                .map_err(|e| AdRestError::Bind(e.to_string()))?,
            BindMechanism::Gssapi => self.gssapi_bind(ldap, profile).await?,
        };

        if result.rc != 0 {
            return Err(AdRestError::Bind(format!(
                "bind as {} failed with code {}: {}",
                credentials.user, result.rc, result.text
            )));
        }
        Ok(())
    }

    #[cfg(feature = "gssapi")]
    async fn gssapi_bind(&self, ldap: &mut Ldap, profile: &ConnectionProfile) -> crate::Result<LdapResult> {
        let host = url::Url::parse(&profile.ldap_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| AdRestError::Bind(format!("no host in {}", profile.ldap_url)))?;

        // KRB5CCNAME must not change until the bind completes.
        let ticket = self
            .tickets
            .acquire(&profile.credentials.user, &profile.credentials.password)
            .await?;
        ticket.export();

        ldap.sasl_gssapi_bind(&host)
            .await
            .map_err(|e| AdRestError::Bind(e.to_string()))
    }

    #[cfg(not(feature = "gssapi"))]
    async fn gssapi_bind(&self, _ldap: &mut Ldap, profile: &ConnectionProfile) -> crate::Result<LdapResult> {
        Err(AdRestError::Bind(format!(
            "profile {} requires GSSAPI, which this build does not include",
            profile.name
        )))
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn open(&self, profile: &ConnectionProfile) -> crate::Result<Box<dyn DirectorySession>> {
        debug!("Connecting to {} for profile {}", profile.ldap_url, profile.name);
        let mut ldap = self.connect(&profile.ldap_url).await?;

        if let Err(e) = self.bind(&mut ldap, profile).await {
            let _ = ldap.unbind().await;
            return Err(e);
        }

        info!("Bound to {} as {}", profile.ldap_url, profile.credentials.user);
        Ok(Box::new(LdapSession { ldap }))
    }
}

pub struct LdapSession {
    ldap: Ldap,
}

fn map_ldap_error(e: LdapError) -> DirectoryError {
    match e {
        LdapError::LdapResult { result } => result_error(&result),
        other => DirectoryError::new(DirectoryErrorKind::Other(LDAP_OTHER), other.to_string()),
    }
}

fn result_error(result: &LdapResult) -> DirectoryError {
    let message = if result.text.is_empty() {
        format!("LDAP operation failed with code {}", result.rc)
    } else {
        result.text.clone()
    };
    DirectoryError::new(DirectoryErrorKind::from_result_code(result.rc), message)
}

fn check(result: LdapResult) -> DirectoryResult<()> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(result_error(&result))
    }
}

fn to_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn value_set(values: &[WireValue]) -> HashSet<WireValue> {
    values.iter().cloned().collect()
}

fn to_mod(operation: &ModifyOperation) -> Mod<WireValue> {
    match operation {
        ModifyOperation::Add(name, values) => Mod::Add(name.as_bytes().to_vec(), value_set(values)),
        ModifyOperation::Replace(name, values) => {
            Mod::Replace(name.as_bytes().to_vec(), value_set(values))
        }
        ModifyOperation::Delete(name) => Mod::Delete(name.as_bytes().to_vec(), HashSet::new()),
    }
}

/// Folds text and binary attribute values back into raw bytes.
fn to_directory_entry(entry: SearchEntry) -> DirectoryEntry {
    let mut attributes = WireAttributes::new();
    for (name, values) in entry.attrs {
        attributes.extend_values(&name, values.into_iter().map(String::into_bytes).collect());
    }
    for (name, values) in entry.bin_attrs {
        attributes.extend_values(&name, values);
    }
    DirectoryEntry::new(entry.dn, attributes)
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: Option<&[String]>,
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let requested: Vec<&str> = match attributes {
            None => vec!["*"],
            Some([]) => vec![NO_ATTRIBUTES],
            Some(names) => names.iter().map(String::as_str).collect(),
        };

        let (results, _) = self
            .ldap
            .search(base, to_scope(scope), filter, requested)
            .await
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;

        let entries: Vec<DirectoryEntry> = results
            .into_iter()
            .filter(|r| !r.is_ref())
            .map(|r| to_directory_entry(SearchEntry::construct(r)))
            .collect();

        debug!("Search under {} matched {} entries", base, entries.len());
        Ok(entries)
    }

    async fn add(&mut self, dn: &str, attributes: &WireAttributes) -> DirectoryResult<()> {
        let attrs: Vec<(WireValue, HashSet<WireValue>)> = attributes
            .iter()
            .map(|(name, values)| (name.as_bytes().to_vec(), value_set(values)))
            .collect();

        let result = self.ldap.add(dn, attrs).await.map_err(map_ldap_error)?;
        check(result)?;
        info!("Added {}", dn);
        Ok(())
    }

    async fn modify(&mut self, dn: &str, operations: &[ModifyOperation]) -> DirectoryResult<()> {
        let mods: Vec<Mod<WireValue>> = operations.iter().map(to_mod).collect();
        let result = self.ldap.modify(dn, mods).await.map_err(map_ldap_error)?;
        check(result)?;
        info!("Modified {} ({} operations)", dn, operations.len());
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        let result = self.ldap.delete(dn).await.map_err(map_ldap_error)?;
        check(result)?;
        info!("Deleted {}", dn);
        Ok(())
    }

    async fn rename(&mut self, dn: &str, new_rdn: &str) -> DirectoryResult<()> {
        let result = self
            .ldap
            .modifydn(dn, new_rdn, true, None)
            .await
            .map_err(map_ldap_error)?;
        check(result)?;
        info!("Renamed {} to {}", dn, new_rdn);
        Ok(())
    }

    async fn close(&mut self) -> DirectoryResult<()> {
        self.ldap.unbind().await.map_err(map_ldap_error)
    }
}
