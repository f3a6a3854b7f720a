//! End-to-end API key tests
//!
//! Tests key management behind the organization session and key use on the
//! brand data routes.

mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;

async fn create_key(app: &TestApp, org: &str, name: &str) -> TestResponse {
    send(
        app,
        json_request("POST", "/keys", &[(ORG_HEADER, org)], &json!({"name": name})),
    )
    .await
}

#[tokio::test]
async fn created_key_is_shown_once() {
    // GIVEN: an org_1 session
    let app = app();

    // WHEN: a key is created and then listed
    let created = create_key(&app, "org_1", "Zapier").await;
    let listed = send(&app, get_with("/keys", &[(ORG_HEADER, "org_1")])).await;

    // THEN: creation returns bh_ + 64 hex, listing never does
    assert_eq!(created.status, StatusCode::CREATED);
    let key = created.body["key"].as_str().unwrap();
    assert!(key.starts_with("bh_"));
    assert_eq!(key.len(), 3 + 64);
    assert!(key[3..].chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(created.body["name"], "Zapier");
    assert!(created.body["createdAt"].is_string());

    assert_eq!(listed.status, StatusCode::OK);
    let entries = listed.body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], created.body["id"]);
    assert_eq!(entries[0]["isActive"], true);
    assert_eq!(entries[0]["lastUsed"], serde_json::Value::Null);
    assert!(entries[0].get("key").is_none());
    assert!(entries[0].get("keyHash").is_none());
}

#[tokio::test]
async fn key_reads_own_organization_and_records_use() {
    let app = app();
    let created = create_key(&app, "org_2", "CI").await;
    let key = created.body["key"].as_str().unwrap();

    let brand = send(&app, get_bearer("/api/brand", key)).await;
    let listed = send(&app, get_with("/keys", &[(ORG_HEADER, "org_2")])).await;

    assert_eq!(brand.status, StatusCode::OK);
    assert_eq!(brand.body["name"], "Globex");
    assert!(listed.body[0]["lastUsed"].is_string());
}

#[tokio::test]
async fn unknown_key_is_rejected() {
    let app = app();

    let response = send(&app, get_bearer("/api/brand", "bh_deadbeef")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({"error": "Invalid or inactive API key"}));
}

#[tokio::test]
async fn revoked_key_stops_working() {
    // GIVEN: a working key
    let app = app();
    let created = create_key(&app, "org_1", "temp").await;
    let key = created.body["key"].as_str().unwrap().to_string();
    let id = created.body["id"].as_str().unwrap().to_string();
    assert_eq!(send(&app, get_bearer("/api/brand", &key)).await.status, StatusCode::OK);

    // WHEN: revoked
    let revoked = send(
        &app,
        json_request("DELETE", "/keys", &[(ORG_HEADER, "org_1")], &json!({"keyId": id})),
    )
    .await;

    // THEN: rejected like an unknown key, still listed as inactive
    assert_eq!(revoked.status, StatusCode::OK);
    assert_eq!(revoked.body, json!({"success": true}));
    let response = send(&app, get_bearer("/api/brand", &key)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Invalid or inactive API key");
    let listed = send(&app, get_with("/keys", &[(ORG_HEADER, "org_1")])).await;
    assert_eq!(listed.body[0]["isActive"], false);
}

#[tokio::test]
async fn cannot_revoke_another_organizations_key() {
    let app = app();
    let created = create_key(&app, "org_b", "theirs").await;
    let key = created.body["key"].as_str().unwrap().to_string();
    let id = created.body["id"].as_str().unwrap().to_string();

    let response = send(
        &app,
        json_request("DELETE", "/keys", &[(ORG_HEADER, "org_a")], &json!({"keyId": id})),
    )
    .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, get_bearer("/api/voices", &key)).await.status, StatusCode::OK);
}

#[tokio::test]
async fn listing_is_scoped_to_session_organization() {
    let app = app();
    create_key(&app, "org_1", "one").await;
    create_key(&app, "org_2", "two").await;

    let listed = send(&app, get_with("/keys", &[(ORG_HEADER, "org_1")])).await;

    let names: Vec<&str> = listed
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["one"]);
}

#[tokio::test]
async fn key_management_requires_session() {
    let app = app();

    let create = send(&app, json_request("POST", "/keys", &[], &json!({"name": "x"}))).await;
    let list = send(&app, get("/keys")).await;
    let revoke = send(&app, json_request("DELETE", "/keys", &[], &json!({"keyId": "x"}))).await;

    assert_eq!(create.status, StatusCode::UNAUTHORIZED);
    assert_eq!(list.status, StatusCode::UNAUTHORIZED);
    assert_eq!(revoke.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guarded_session_needs_shared_secret() {
    let app = app_with(|c| c.session.shared_secret = Some("proxy-secret".to_string()));

    let spoofed = create_key(&app, "org_1", "x").await;
    let trusted = send(
        &app,
        json_request(
            "POST",
            "/keys",
            &[(ORG_HEADER, "org_1"), ("x-brandhalo-session-secret", "proxy-secret")],
            &json!({"name": "x"}),
        ),
    )
    .await;

    assert_eq!(spoofed.status, StatusCode::UNAUTHORIZED);
    assert_eq!(trusted.status, StatusCode::CREATED);
}

#[tokio::test]
async fn blank_name_is_rejected() {
    let app = app();

    let response = create_key(&app, "org_1", "   ").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
