//! HTTP handlers for the authorization server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/.well-known/oauth-authorization-server` | RFC 8414 metadata |
//! | `POST` | `/register` | RFC 7591 dynamic client registration |
//! | `GET` | `/authorize` | Member approval; redirects with a code |
//! | `POST` | `/token` | Code or refresh token → access token |
//!
//! ## Error delivery
//!
//! Once the redirect target is known to be safe (valid and registered for the
//! client), authorization errors go back to the client as
//! `redirect_uri?error=..&error_description=..&state=..`. A missing, invalid
//! or unregistered `redirect_uri` gets a JSON `400` instead.
//!
//! The token endpoint always answers JSON with `Cache-Control: no-store`.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};
use url::Url;

use super::OAuthServer;
use super::registration::{RegistrationRequest, validate_redirect_uri};
use crate::audit::{self, AuditEvent};
use crate::credentials::redact;
use crate::Error;

// ── Request / Response types ───────────────────────────────────────────────

/// `GET /authorize` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    /// Must be `code`.
    pub response_type: Option<String>,
    /// Registered client ID.
    pub client_id: Option<String>,
    /// One of the client's registered redirect URIs.
    pub redirect_uri: Option<String>,
    /// Requested scope; defaults to the client's registered scope.
    pub scope: Option<String>,
    /// Opaque client state, echoed back.
    pub state: Option<String>,
}

/// `POST /token` form body.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`.
    pub grant_type: Option<String>,
    /// Authorization code (code grant).
    pub code: Option<String>,
    /// Redirect URI used at `/authorize` (code grant).
    pub redirect_uri: Option<String>,
    /// Requesting client.
    pub client_id: Option<String>,
    /// Refresh token (refresh grant).
    pub refresh_token: Option<String>,
}

/// Successful token response (RFC 6749 §5.1).
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// The `bht_` bearer token.
    pub access_token: String,
    /// Always `"Bearer"`.
    pub token_type: &'static str,
    /// Seconds until the access token expires.
    pub expires_in: u64,
    /// The `bhr_` refresh token.
    pub refresh_token: String,
    /// Granted scope.
    pub scope: String,
}

/// Dynamic registration response (RFC 7591 §3.2.1).
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    /// Generated client ID.
    pub client_id: String,
    /// Public clients never receive a secret.
    pub client_secret: Option<String>,
    /// Registration time, seconds since the epoch.
    pub client_id_issued_at: i64,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Registered redirect URIs.
    pub redirect_uris: Vec<String>,
    /// Allowed grant types.
    pub grant_types: Vec<String>,
    /// Allowed response types.
    pub response_types: Vec<String>,
    /// Registered scope.
    pub scope: String,
    /// Always `"none"`.
    pub token_endpoint_auth_method: &'static str,
}

// ── Route builder ─────────────────────────────────────────────────────────

/// Build the authorization server routes.
///
/// Mounted without the bearer middleware: these endpoints are how a client
/// obtains a bearer token in the first place. `/authorize` checks the
/// organization session itself.
pub fn oauth_routes(server: Arc<OAuthServer>) -> Router {
    Router::new()
        .route("/.well-known/oauth-authorization-server", get(metadata))
        .route("/register", post(register))
        .route("/authorize", get(authorize))
        .route("/token", post(token))
        .with_state(server)
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
async fn metadata(State(server): State<Arc<OAuthServer>>) -> impl IntoResponse {
    Json(server.metadata.clone())
}

/// `POST /register` — register a public client.
async fn register(
    State(server): State<Arc<OAuthServer>>,
    Json(body): Json<RegistrationRequest>,
) -> Response {
    match server.registrations.register(body).await {
        Ok(client) => {
            audit::emit(&AuditEvent::client_registered(&client.client_id, &client.scope));
            let response = RegistrationResponse {
                client_id: client.client_id,
                client_secret: None,
                client_id_issued_at: client.created_at.timestamp(),
                client_name: client.client_name,
                redirect_uris: client.redirect_uris,
                grant_types: client.grant_types,
                response_types: client.response_types,
                scope: client.scope,
                token_endpoint_auth_method: "none",
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(e @ Error::InvalidRedirectUri(_)) => {
            warn!(error = %e, "Client registration rejected");
            oauth_error(StatusCode::BAD_REQUEST, e.oauth_code(), &e.to_string())
        }
        Err(e) => server_error(&e),
    }
}

/// `GET /authorize` — approve an authorization request for the member's
/// active organization.
async fn authorize(
    State(server): State<Arc<OAuthServer>>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let state = params.state.as_deref();

    // Without a safe redirect target there is nowhere to send errors.
    let Some(redirect_uri) = params.redirect_uri.as_deref() else {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_request", "redirect_uri is required");
    };
    let redirect = match validate_redirect_uri(redirect_uri) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Authorization request with unsafe redirect_uri");
            return oauth_error(StatusCode::BAD_REQUEST, e.oauth_code(), &e.to_string());
        }
    };

    let client_id = params.client_id.as_deref().unwrap_or_default();
    let client = match server.registrations.get(client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            audit::emit(&AuditEvent::denied(format!("unknown client_id: {client_id}")));
            let e = Error::InvalidClient(client_id.to_string());
            return redirect_error(redirect, e.oauth_code(), "Unknown client_id", state);
        }
        Err(e) => return server_error(&e),
    };

    if !client.allows_redirect(redirect_uri) {
        warn!(client_id = %client.client_id, redirect_uri, "redirect_uri not registered for client");
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "redirect_uri is not registered for this client",
        );
    }

    if params.response_type.as_deref() != Some("code") {
        let e = Error::UnsupportedResponseType(
            params.response_type.clone().unwrap_or_default(),
        );
        return redirect_error(redirect, e.oauth_code(), "response_type must be 'code'", state);
    }

    let scope = params
        .scope
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(client.scope.as_str())
        .to_string();
    if !server.supports_scope(&scope) {
        return redirect_error(redirect, "invalid_scope", "Requested scope is not supported", state);
    }

    let Some(session) = server.session.resolve(&headers).await else {
        debug!(client_id = %client.client_id, "Authorization request without organization session");
        return oauth_error(
            StatusCode::UNAUTHORIZED,
            "login_required",
            "An organization session is required to authorize this client",
        );
    };

    let code = match server
        .codes
        .issue(&session.organization_id, &client.client_id, redirect_uri, &scope)
        .await
    {
        Ok(code) => code,
        Err(e) => return server_error(&e),
    };
    audit::emit(&AuditEvent::code_issued(
        &code.organization_id,
        &code.client_id,
        &code.code,
    ));

    let mut target = redirect;
    {
        let mut query = target.query_pairs_mut();
        query.append_pair("code", &code.code);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    found(&target)
}

/// `POST /token` — exchange a code or refresh token.
async fn token(
    State(server): State<Arc<OAuthServer>>,
    Form(body): Form<TokenRequest>,
) -> Response {
    match body.grant_type.as_deref() {
        Some("authorization_code") => exchange_code(&server, body).await,
        Some("refresh_token") => exchange_refresh_token(&server, body).await,
        Some(other) => {
            warn!(grant_type = %other, "Unsupported grant_type");
            token_error("unsupported_grant_type", "grant_type must be 'authorization_code' or 'refresh_token'")
        }
        None => token_error("invalid_request", "grant_type is required"),
    }
}

async fn exchange_code(server: &OAuthServer, body: TokenRequest) -> Response {
    let (Some(code), Some(client_id), Some(redirect_uri)) =
        (body.code, body.client_id, body.redirect_uri)
    else {
        return token_error("invalid_request", "code, client_id and redirect_uri are required");
    };

    // Consumed before the binding checks: a mismatched attempt burns the code.
    let entry = match server.codes.consume(&code).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            audit::emit(&AuditEvent::denied(format!(
                "authorization code invalid, expired or replayed: {}",
                redact(&code)
            )));
            return token_error("invalid_grant", "Authorization code is invalid or expired");
        }
        Err(e) => return server_error(&e),
    };

    if entry.client_id != client_id || entry.redirect_uri != redirect_uri {
        audit::emit(&AuditEvent::denied(format!(
            "authorization code presented by wrong client or redirect_uri: {client_id}"
        )));
        return token_error("invalid_grant", "Authorization code was not issued to this client");
    }
    audit::emit(&AuditEvent::code_redeemed(&entry.organization_id, &entry.client_id));

    match server
        .tokens
        .issue(&entry.organization_id, &entry.client_id, &entry.scope)
        .await
    {
        Ok(token) => {
            audit::emit(&AuditEvent::token_issued(
                &token.organization_id,
                &token.client_id,
                &token.token,
                &token.scope,
            ));
            token_response(server, token)
        }
        Err(e) => server_error(&e),
    }
}

async fn exchange_refresh_token(server: &OAuthServer, body: TokenRequest) -> Response {
    let (Some(refresh_token), Some(client_id)) = (body.refresh_token, body.client_id) else {
        return token_error("invalid_request", "refresh_token and client_id are required");
    };

    match server.tokens.refresh(&refresh_token, &client_id).await {
        Ok(Some(token)) => {
            audit::emit(&AuditEvent::token_refreshed(
                &token.organization_id,
                &token.client_id,
                &token.token,
            ));
            token_response(server, token)
        }
        Ok(None) => {
            audit::emit(&AuditEvent::denied(format!(
                "refresh token invalid, expired or replayed: {}",
                redact(&refresh_token)
            )));
            token_error("invalid_grant", "Refresh token is invalid or expired")
        }
        Err(e) => server_error(&e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn token_response(server: &OAuthServer, token: super::AccessToken) -> Response {
    let response = TokenResponse {
        expires_in: server.tokens.access_ttl().as_secs(),
        access_token: token.token,
        token_type: "Bearer",
        refresh_token: token.refresh_token,
        scope: token.scope,
    };
    no_store((StatusCode::OK, Json(response)).into_response())
}

fn token_error(error: &str, description: &str) -> Response {
    no_store(oauth_error(StatusCode::BAD_REQUEST, error, description))
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Send an OAuth error back to the client's redirect URI.
fn redirect_error(mut target: Url, error: &str, description: &str, state: Option<&str>) -> Response {
    {
        let mut query = target.query_pairs_mut();
        query.append_pair("error", error);
        query.append_pair("error_description", description);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    found(&target)
}

/// `302 Found` to `target`.
fn found(target: &Url) -> Response {
    match HeaderValue::from_str(target.as_str()) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(e) => server_error(&Error::Internal(format!("unencodable redirect target: {e}"))),
    }
}

/// JSON OAuth error body (RFC 6749 §5.2).
fn oauth_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(json!({"error": error, "error_description": description})),
    )
        .into_response()
}

/// Log an infrastructure failure and answer a generic 500.
pub(crate) fn server_error(e: &Error) -> Response {
    error!(error = %e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "server_error"})),
    )
        .into_response()
}
