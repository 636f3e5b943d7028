use super::AppState;
use crate::directory::SearchScope;
use crate::profiles::ConnectionProfile;
use crate::reconcile::UpdateMode;
use crate::service::{parse_attribute_list, SearchRequest};
use crate::transcode::{ExternalEntry, RequestError};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/connections", get(list_connections).post(create_connection))
        .route(
            "/connections/:name",
            get(get_connection)
                .delete(delete_connection)
                .put(replace_connection)
                .patch(patch_connection),
        )
        .route(
            "/connections/:name/ldap/*base",
            get(search_entries)
                .post(create_entry)
                .put(replace_entry)
                .patch(patch_entry)
                .delete(delete_entry),
        )
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct LdapQuery {
    pub filter: Option<String>,
    pub attributes: Option<String>,
    pub scope: Option<String>,
}

impl LdapQuery {
    fn into_request(self, base: String) -> SearchRequest {
        SearchRequest {
            base,
            scope: SearchScope::from_param(self.scope.as_deref()),
            filter: self.filter,
            attributes: parse_attribute_list(self.attributes.as_deref()),
        }
    }
}

fn parse_body(body: &Bytes) -> crate::Result<Value> {
    serde_json::from_slice(body).map_err(|e| RequestError::InvalidBody(e.to_string()).into())
}

async fn list_connections(State(state): State<AppState>) -> Json<Vec<ConnectionProfile>> {
    Json(state.profiles.list().iter().map(ConnectionProfile::masked).collect())
}

async fn create_connection(
    State(state): State<AppState>,
    body: Bytes,
) -> crate::Result<impl IntoResponse> {
    let profile = state.profiles.create(parse_body(&body)?).await?;
    Ok((StatusCode::CREATED, Json(profile.masked())))
}

async fn get_connection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> crate::Result<Json<ConnectionProfile>> {
    Ok(Json(state.profiles.get(&name)?.masked()))
}

async fn delete_connection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> crate::Result<StatusCode> {
    state.profiles.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_connection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> crate::Result<Json<ConnectionProfile>> {
    let profile = state.profiles.update(&name, parse_body(&body)?, false).await?;
    Ok(Json(profile.masked()))
}

async fn patch_connection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> crate::Result<Json<ConnectionProfile>> {
    let profile = state.profiles.update(&name, parse_body(&body)?, true).await?;
    Ok(Json(profile.masked()))
}

async fn search_entries(
    State(state): State<AppState>,
    Path((name, base)): Path<(String, String)>,
    Query(query): Query<LdapQuery>,
) -> crate::Result<Json<Vec<ExternalEntry>>> {
    let profile = state.profiles.get(&name)?;
    let entries = state.service.get(&profile, &query.into_request(base)).await?;
    Ok(Json(entries))
}

async fn create_entry(
    State(state): State<AppState>,
    Path((name, base)): Path<(String, String)>,
    Query(query): Query<LdapQuery>,
    body: Bytes,
) -> crate::Result<Json<Vec<ExternalEntry>>> {
    let profile = state.profiles.get(&name)?;
    let body = parse_body(&body)?;
    let entry = state
        .service
        .create(&profile, &query.into_request(base), &body)
        .await?;
    Ok(Json(vec![entry]))
}

async fn update_entry(
    state: AppState,
    name: String,
    base: String,
    query: LdapQuery,
    body: Bytes,
    mode: UpdateMode,
) -> crate::Result<Json<Vec<ExternalEntry>>> {
    let profile = state.profiles.get(&name)?;
    let body = parse_body(&body)?;
    let entry = state
        .service
        .update(&profile, &query.into_request(base), &body, mode)
        .await?;
    Ok(Json(vec![entry]))
}

async fn replace_entry(
    State(state): State<AppState>,
    Path((name, base)): Path<(String, String)>,
    Query(query): Query<LdapQuery>,
    body: Bytes,
) -> crate::Result<Json<Vec<ExternalEntry>>> {
    update_entry(state, name, base, query, body, UpdateMode::Full).await
}

async fn patch_entry(
    State(state): State<AppState>,
    Path((name, base)): Path<(String, String)>,
    Query(query): Query<LdapQuery>,
    body: Bytes,
) -> crate::Result<Json<Vec<ExternalEntry>>> {
    update_entry(state, name, base, query, body, UpdateMode::Partial).await
}

async fn delete_entry(
    State(state): State<AppState>,
    Path((name, base)): Path<(String, String)>,
    Query(query): Query<LdapQuery>,
) -> crate::Result<Json<Value>> {
    let profile = state.profiles.get(&name)?;
    state.service.delete(&profile, &query.into_request(base)).await?;
    Ok(Json(json!({})))
}
