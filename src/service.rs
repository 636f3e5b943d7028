//! Search, create, update and delete against one directory session per
//! call.

use crate::codec::CodecTable;
use crate::directory::{
    DirectoryConnector, DirectoryEntry, DirectorySession, SearchScope, WireAttributes,
    DEFAULT_FILTER,
};
use crate::profiles::ConnectionProfile;
use crate::reconcile::{reconcile, UpdateMode};
use crate::transcode::{decode_attributes, encode_entry, request_attributes, ExternalEntry};
use crate::AdRestError;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where to look: base DN, scope, filter and the attributes to return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub filter: Option<String>,
    pub attributes: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    pub fn filter(&self) -> &str {
        match self.filter.as_deref().map(str::trim) {
            Some(filter) if !filter.is_empty() => filter,
            _ => DEFAULT_FILTER,
        }
    }
}

/// Splits the comma separated `attributes` query parameter.
pub fn parse_attribute_list(param: Option<&str>) -> Option<Vec<String>> {
    param.filter(|p| !p.is_empty()).map(|p| {
        p.split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    })
}

/// Searches expecting exactly one entry. `on_empty` is returned when
/// nothing matches.
pub async fn search_one(
    session: &mut dyn DirectorySession,
    base: &str,
    scope: SearchScope,
    filter: &str,
    attributes: Option<&[String]>,
    on_empty: AdRestError,
) -> crate::Result<DirectoryEntry> {
    let mut entries = session.search(base, scope, filter, attributes).await?;
    match entries.len() {
        0 => Err(on_empty),
        1 => Ok(entries.remove(0)),
        n => {
            debug!("Search under {} with {} matched {} entries", base, filter, n);
            Err(AdRestError::NonUniqueResults)
        }
    }
}

/// DN for a new object under `container_dn`. Organizational units are
/// named by `ou`, everything else by `cn`; `name` stands in when the
/// naming attribute itself is absent.
pub fn new_object_dn(
    codecs: &CodecTable,
    container_dn: &str,
    attributes: &WireAttributes,
) -> crate::Result<String> {
    let is_ou = attributes
        .get("objectClass")
        .and_then(|values| codecs.format("objectClass", values))
        .map(|formatted| match formatted {
            Value::Array(classes) => classes
                .iter()
                .any(|c| c.as_str().is_some_and(|c| c.eq_ignore_ascii_case("organizationalUnit"))),
            Value::String(class) => class.eq_ignore_ascii_case("organizationalUnit"),
            _ => false,
        })
        .unwrap_or(false);

    let naming = if is_ou { "ou" } else { "cn" };
    let source = [naming, "name"]
        .into_iter()
        .find(|name| attributes.contains(name))
        .ok_or_else(|| AdRestError::MissingAttribute(vec![naming.to_string()]))?;

    let value = attributes
        .get(source)
        .and_then(|values| codecs.format(source, values))
        .and_then(|formatted| match formatted {
            Value::Array(values) => values.into_iter().next(),
            scalar => Some(scalar),
        })
        .and_then(|value| match value {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .ok_or_else(|| AdRestError::MissingAttribute(vec![naming.to_string()]))?;

    Ok(format!(
        "{}={},{}",
        naming,
        ldap3::dn_escape(value.as_str()),
        container_dn
    ))
}

#[derive(Clone)]
pub struct AdService {
    codecs: Arc<CodecTable>,
    connector: Arc<dyn DirectoryConnector>,
}

impl AdService {
    pub fn new(codecs: Arc<CodecTable>, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self { codecs, connector }
    }

    pub fn codecs(&self) -> &CodecTable {
        &self.codecs
    }

    async fn open(&self, profile: &ConnectionProfile) -> crate::Result<Box<dyn DirectorySession>> {
        self.connector.open(profile).await
    }

    async fn close(mut session: Box<dyn DirectorySession>) {
        if let Err(e) = session.close().await {
            warn!("Failed to close directory session: {}", e);
        }
    }

    pub async fn get(
        &self,
        profile: &ConnectionProfile,
        request: &SearchRequest,
    ) -> crate::Result<Vec<ExternalEntry>> {
        let mut session = self.open(profile).await?;
        let result = session
            .search(
                &request.base,
                request.scope,
                request.filter(),
                request.attributes.as_deref(),
            )
            .await;
        Self::close(session).await;

        Ok(result?
            .iter()
            .map(|entry| encode_entry(&self.codecs, entry))
            .collect())
    }

    pub async fn delete(&self, profile: &ConnectionProfile, request: &SearchRequest) -> crate::Result<()> {
        let mut session = self.open(profile).await?;
        let result = self.delete_in(session.as_mut(), request).await;
        Self::close(session).await;
        result
    }

    async fn delete_in(&self, session: &mut dyn DirectorySession, request: &SearchRequest) -> crate::Result<()> {
        let target = search_one(
            session,
            &request.base,
            request.scope,
            request.filter(),
            Some(&[]),
            AdRestError::EmptyResults,
        )
        .await?;

        session.delete(&target.dn).await?;
        debug!("Deleted {}", target.dn);
        Ok(())
    }

    /// Creates an object inside the single container matched by `request`.
    pub async fn create(
        &self,
        profile: &ConnectionProfile,
        request: &SearchRequest,
        body: &Value,
    ) -> crate::Result<ExternalEntry> {
        let attributes = request_attributes(body)?;

        let mut session = self.open(profile).await?;
        let result = self.create_in(session.as_mut(), request, attributes).await;
        Self::close(session).await;
        result
    }

    async fn create_in(
        &self,
        session: &mut dyn DirectorySession,
        request: &SearchRequest,
        attributes: &serde_json::Map<String, Value>,
    ) -> crate::Result<ExternalEntry> {
        let container = search_one(
            session,
            &request.base,
            request.scope,
            request.filter(),
            Some(&[]),
            AdRestError::EmptyResults,
        )
        .await?;

        let validated = decode_attributes(&self.codecs, attributes)?;
        let validated =
            WireAttributes::from_pairs(validated).map_err(AdRestError::AmbiguousAttributeKey)?;
        let dn = new_object_dn(&self.codecs, &container.dn, &validated)?;

        session.add(&dn, &validated).await?;
        debug!("Created {}", dn);

        self.reload(session, &dn, request).await
    }

    /// Updates the single entry matched by `request`, renaming it first
    /// when its naming attribute changes.
    pub async fn update(
        &self,
        profile: &ConnectionProfile,
        request: &SearchRequest,
        body: &Value,
        mode: UpdateMode,
    ) -> crate::Result<ExternalEntry> {
        let attributes = request_attributes(body)?;

        let mut session = self.open(profile).await?;
        let result = self.update_in(session.as_mut(), request, attributes, mode).await;
        Self::close(session).await;
        result
    }

    async fn update_in(
        &self,
        session: &mut dyn DirectorySession,
        request: &SearchRequest,
        attributes: &serde_json::Map<String, Value>,
        mode: UpdateMode,
    ) -> crate::Result<ExternalEntry> {
        let old = search_one(
            session,
            &request.base,
            request.scope,
            request.filter(),
            None,
            AdRestError::EmptyResults,
        )
        .await?;

        let validated = decode_attributes(&self.codecs, attributes)?;
        let plan = reconcile(&self.codecs, &old.dn, &old.attributes, validated, mode)?;

        if let Some(rename) = &plan.rename {
            session.rename(&rename.dn, &rename.new_rdn).await?;
            debug!("Renamed {} to {}", rename.dn, plan.target_dn);
        }
        if !plan.modifications.is_empty() {
            session.modify(&plan.target_dn, &plan.modifications).await?;
            debug!(
                "Applied {} modification(s) to {}",
                plan.modifications.len(),
                plan.target_dn
            );
        }

        self.reload(session, &plan.target_dn, request).await
    }

    /// Reads back a freshly written entry by its exact DN.
    async fn reload(
        &self,
        session: &mut dyn DirectorySession,
        dn: &str,
        request: &SearchRequest,
    ) -> crate::Result<ExternalEntry> {
        let entry = search_one(
            session,
            dn,
            SearchScope::Base,
            DEFAULT_FILTER,
            request.attributes.as_deref(),
            AdRestError::ReloadAfterModify(dn.to_string()),
        )
        .await?;
        Ok(encode_entry(&self.codecs, &entry))
    }
}
