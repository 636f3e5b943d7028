use adrest::codec::CodecTable;
use adrest::directory::MemoryConnector;
use adrest::profiles::ProfileStore;
use adrest::schema::SchemaRegistry;
use adrest::server::{router, AppState};
use adrest::service::AdService;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const DIRECTORY: &str = r#"
directory:
  base_dn: "dc=example,dc=com"
entries:
  - dn: "dc=example,dc=com"
    objectClass: [top, domain]
    dc: example
  - dn: "ou=Users,dc=example,dc=com"
    objectClass: [top, organizationalUnit]
    ou: Users
  - dn: "cn=Alice Smith,ou=Users,dc=example,dc=com"
    objectClass: [top, person, organizationalPerson, user]
    cn: Alice Smith
    sAMAccountName: asmith
    mail: alice@example.com
    userAccountControl: 512
    accountExpires: "9223372036854775807"
    pwdLastSet: "132223104000000000"
    memberOf: ["cn=Staff,dc=example,dc=com"]
  - dn: "cn=Bob Jones,ou=Users,dc=example,dc=com"
    objectClass: [top, person, organizationalPerson, user]
    cn: Bob Jones
    sAMAccountName: bjones
    userAccountControl: 514
"#;

const USERS: &str = "/v0beta1/connections/corp/ldap/ou=Users,dc=example,dc=com";

fn app() -> (Router, MemoryConnector) {
    let connector = MemoryConnector::from_yaml_str(DIRECTORY).unwrap();
    let codecs = Arc::new(CodecTable::new(SchemaRegistry::builtin().unwrap()));
    let service = AdService::new(codecs, Arc::new(connector.clone()));
    let state = AppState::new(Arc::new(ProfileStore::new()), service);
    (router(state), connector)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn app_with_profile() -> (Router, MemoryConnector) {
    let (app, connector) = app();
    let (status, _) = send(
        &app,
        Method::POST,
        "/v0beta1/connections",
        Some(json!({
            "name": "corp",
            "ldapUrl": "ldap://dc1.example.com",
            "credentials": {"user": "svc-adrest", "password": "hunter2"},
            "bindMechanism": "simple"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (app, connector)
}

#[tokio::test]
async fn test_connection_profiles_lifecycle() {
    let (app, _) = app();

    let (status, body) = send(&app, Method::GET, "/v0beta1/connections", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let profile = json!({
        "name": "corp",
        "ldapUrl": "ldap://dc1.example.com",
        "credentials": {"user": "svc-adrest", "password": "hunter2"}
    });
    let (status, body) = send(&app, Method::POST, "/v0beta1/connections", Some(profile.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["credentials"]["password"], json!("******"));
    assert_eq!(body["bindMechanism"], json!("gssapi"));

    let (status, body) = send(&app, Method::POST, "/v0beta1/connections", Some(profile)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("corp"));

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/v0beta1/connections/corp",
        Some(json!({"ldapUrl": "ldaps://dc2.example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ldapUrl"], json!("ldaps://dc2.example.com"));
    assert_eq!(body["credentials"]["user"], json!("svc-adrest"));
    assert_eq!(body["credentials"]["password"], json!("******"));

    let (status, _) = send(
        &app,
        Method::PUT,
        "/v0beta1/connections/corp",
        Some(json!({"name": "other", "ldapUrl": "ldap://x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::DELETE, "/v0beta1/connections/corp", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = send(&app, Method::GET, "/v0beta1/connections/corp", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_search_formats_ad_attributes() {
    let (app, _) = app_with_profile().await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("{}?filter=(sAMAccountName=asmith)", USERS),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    let attributes = &entries[0]["attributes"];
    assert_eq!(entries[0]["dn"], json!("cn=Alice Smith,ou=Users,dc=example,dc=com"));
    assert_eq!(attributes["cn"], json!("Alice Smith"));
    assert_eq!(attributes["userAccountControl"], json!(512));
    assert_eq!(attributes["accountExpires"], json!("never"));
    assert_eq!(attributes["pwdLastSet"], json!("2020-01-01T00:00:00+00:00"));
    assert_eq!(attributes["memberOf"], json!(["cn=Staff,dc=example,dc=com"]));
}

#[tokio::test]
async fn test_search_scope_and_projection() {
    let (app, _) = app_with_profile().await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("{}?scope=one&attributes=cn,mail", USERS),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        let names: Vec<&String> = entry["attributes"].as_object().unwrap().keys().collect();
        assert!(names.iter().all(|n| *n == "cn" || *n == "mail"), "{:?}", names);
    }

    let (status, body) = send(&app, Method::GET, &format!("{}?scope=base", USERS), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_errors() {
    let (app, _) = app_with_profile().await;

    let (status, _) = send(
        &app,
        Method::GET,
        "/v0beta1/connections/corp/ldap/ou=Missing,dc=example,dc=com",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, &format!("{}?filter=(cn=Alice", USERS), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::GET,
        "/v0beta1/connections/unknown/ldap/dc=example,dc=com",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_entry() {
    let (app, connector) = app_with_profile().await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{}?scope=base", USERS),
        Some(json!({
            "attributes": {
                "objectClass": ["top", "person", "organizationalPerson", "user"],
                "cn": "Carol White",
                "sAMAccountName": "cwhite",
                "unicodePwd": "Passw0rd!",
                "accountExpires": "2030-06-01T00:00:00Z",
                "objectSid": "S-1-5-21-1004336348-1177238915-682003330-1105"
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["dn"], json!("cn=Carol White,ou=Users,dc=example,dc=com"));
    let attributes = &entries[0]["attributes"];
    assert_eq!(attributes["accountExpires"], json!("2030-06-01T00:00:00+00:00"));
    assert_eq!(
        attributes["objectSid"],
        json!("S-1-5-21-1004336348-1177238915-682003330-1105")
    );
    assert!(attributes.get("unicodePwd").is_none());

    assert!(connector
        .get("cn=Carol White,ou=Users,dc=example,dc=com")
        .unwrap()
        .attributes
        .contains("unicodePwd"));
}

#[tokio::test]
async fn test_create_organizational_unit() {
    let (app, _) = app_with_profile().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v0beta1/connections/corp/ldap/dc=example,dc=com?scope=base",
        Some(json!({"attributes": {"objectClass": ["top", "organizationalUnit"], "ou": "Groups"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body[0]["dn"], json!("ou=Groups,dc=example,dc=com"));
}

#[tokio::test]
async fn test_create_rejects_bad_requests() {
    let (app, _) = app_with_profile().await;
    let uri = format!("{}?scope=base", USERS);

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({"attributes": {"objectClass": "user", "cn": "X", "accountExpires": "soon", "userAccountControl": "x"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("accountExpires") && message.contains("userAccountControl"));

    let (status, _) = send(&app, Method::POST, &uri, Some(json!({"cn": "X"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({"attributes": {"objectClass": "user", "sAMAccountName": "nocn"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("cn"));

    let (status, body) = send(
        &app,
        Method::POST,
        USERS,
        Some(json!({"attributes": {"objectClass": "user", "cn": "Y"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("operation expects singular result"));
}

#[tokio::test]
async fn test_patch_and_rename() {
    let (app, connector) = app_with_profile().await;

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("{}?filter=(sAMAccountName=bjones)", USERS),
        Some(json!({"attributes": {"cn": "Robert Jones", "mail": "robert@example.com"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body[0]["dn"], json!("cn=Robert Jones,ou=Users,dc=example,dc=com"));
    assert_eq!(body[0]["attributes"]["mail"], json!("robert@example.com"));
    assert_eq!(body[0]["attributes"]["userAccountControl"], json!(514));

    assert!(connector.get("cn=Bob Jones,ou=Users,dc=example,dc=com").is_none());
}

#[tokio::test]
async fn test_put_replaces_attribute_set() {
    let (app, _) = app_with_profile().await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("{}?filter=(sAMAccountName=asmith)", USERS),
        Some(json!({
            "attributes": {
                "objectClass": ["top", "person", "organizationalPerson", "user"],
                "cn": "Alice Smith",
                "sAMAccountName": "asmith",
                "userAccountControl": 514
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let attributes = body[0]["attributes"].as_object().unwrap();
    assert_eq!(attributes["userAccountControl"], json!(514));
    assert!(!attributes.contains_key("mail"));
    assert!(!attributes.contains_key("memberOf"));
}

#[tokio::test]
async fn test_update_missing_entry() {
    let (app, _) = app_with_profile().await;

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("{}?filter=(sAMAccountName=nobody)", USERS),
        Some(json!({"attributes": {"mail": "x@example.com"}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], json!("operation expects singular result"));
}

#[tokio::test]
async fn test_delete_entry() {
    let (app, connector) = app_with_profile().await;
    let uri = format!("{}?filter=(sAMAccountName=bjones)", USERS);

    let (status, body) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    assert!(connector.get("cn=Bob Jones,ou=Users,dc=example,dc=com").is_none());

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (app, _) = app_with_profile().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("{}?scope=base", USERS))
        .header("content-type", "application/json")
        .body(Body::from("{\"attributes\": "))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
