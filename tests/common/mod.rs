//! Shared helpers for driving the gateway router in-process.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use serde_json::Value;
use tempfile::NamedTempFile;
use tower::ServiceExt;
use url::Url;

use brandhalo_gateway::config::Config;
use brandhalo_gateway::gateway::{AppState, create_router};

pub const ORG_HEADER: &str = "x-brandhalo-org-id";
pub const REDIRECT_URI: &str = "https://chat.openai.com/cb";

pub const BRAND_DATA: &str = r"
organizations:
  org_1:
    profile:
      name: Acme
      tagline: Anvils for everyone
    personas:
      - name: Builder
    voices:
      - name: Playful
  org_2:
    profile:
      name: Globex
";

/// A router plus the temp file backing its brand data.
pub struct TestApp {
    pub router: Router,
    _data: NamedTempFile,
}

/// Build an app over default configuration, customized by `tweak`.
pub fn app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let mut data = NamedTempFile::new().unwrap();
    data.write_all(BRAND_DATA.as_bytes()).unwrap();

    let mut config = Config::default();
    config.data.file = Some(data.path().to_path_buf());
    tweak(&mut config);

    let state = Arc::new(AppState::from_config(&config).unwrap());
    TestApp {
        router: create_router(state),
        _data: data,
    }
}

pub fn app() -> TestApp {
    app_with(|_| {})
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> Url {
        let value = self.headers.get(header::LOCATION).unwrap().to_str().unwrap();
        Url::parse(value).unwrap()
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.location()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> TestResponse {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn get_with(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::get(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, headers: &[(&str, &str)], body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn form_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
        .unwrap()
}

pub fn get_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

/// Register a client for [`REDIRECT_URI`] and return its ID.
pub async fn register_client(app: &TestApp) -> String {
    let response = send(
        app,
        json_request(
            "POST",
            "/register",
            &[],
            &serde_json::json!({
                "client_name": "ChatGPT",
                "redirect_uris": [REDIRECT_URI],
            }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.body["client_id"].as_str().unwrap().to_string()
}

pub fn authorize_uri(client_id: &str, redirect_uri: &str, state: &str) -> String {
    let mut url = Url::parse("http://gateway.test/authorize").unwrap();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", "brand:read")
        .append_pair("state", state);
    format!("/authorize?{}", url.query().unwrap())
}

/// Run `/authorize` as a member of `org` and return the issued code.
pub async fn authorize(app: &TestApp, client_id: &str, org: &str) -> String {
    let response = send(
        app,
        get_with(&authorize_uri(client_id, REDIRECT_URI, "xyz"), &[(ORG_HEADER, org)]),
    )
    .await;
    assert_eq!(response.status, StatusCode::FOUND);
    response.query("code").unwrap()
}

/// Exchange a code; returns the raw response.
pub async fn exchange(app: &TestApp, code: &str, client_id: &str) -> TestResponse {
    send(
        app,
        form_request(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client_id),
                ("redirect_uri", REDIRECT_URI),
            ],
        ),
    )
    .await
}
