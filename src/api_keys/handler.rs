//! HTTP handlers for organization API key management.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/keys` | Create a key; the plaintext is returned once |
//! | `GET` | `/keys` | List the organization's keys (no secrets) |
//! | `DELETE` | `/keys` | Revoke a key, body `{"keyId": "..."}` |
//!
//! All three require an organization session from the upstream session
//! system; a request without one gets `401`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::json;

use super::ApiKeyStore;
use crate::audit::{self, AuditEvent};
use crate::oauth::handler::server_error;
use crate::session::{SessionContext, SessionResolver};

/// Shared state for the key management routes.
pub struct ApiKeyState {
    /// Key storage.
    pub keys: Arc<ApiKeyStore>,
    /// Organization session hand-off.
    pub session: Arc<dyn SessionResolver>,
}

/// `POST /keys` body.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    /// Label for the new key.
    pub name: String,
}

/// `DELETE /keys` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeKeyRequest {
    /// Record id of the key to revoke.
    pub key_id: String,
}

/// Build the key management routes.
pub fn api_key_routes(state: Arc<ApiKeyState>) -> Router {
    Router::new()
        .route("/keys", post(create_key).get(list_keys).delete(revoke_key))
        .with_state(state)
}

async fn create_key(
    State(state): State<Arc<ApiKeyState>>,
    headers: HeaderMap,
    Json(body): Json<CreateKeyRequest>,
) -> Response {
    let session = match require_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let name = body.name.trim();
    if name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "name is required"})),
        )
            .into_response();
    }

    match state.keys.create(&session.organization_id, name).await {
        Ok(created) => {
            audit::emit(&AuditEvent::key_created(&session.organization_id, &created.id));
            (StatusCode::CREATED, Json(created)).into_response()
        }
        Err(e) => server_error(&e),
    }
}

async fn list_keys(State(state): State<Arc<ApiKeyState>>, headers: HeaderMap) -> Response {
    let session = match require_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match state.keys.list(&session.organization_id).await {
        Ok(keys) => Json(keys).into_response(),
        Err(e) => server_error(&e),
    }
}

async fn revoke_key(
    State(state): State<Arc<ApiKeyState>>,
    headers: HeaderMap,
    Json(body): Json<RevokeKeyRequest>,
) -> Response {
    let session = match require_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match state.keys.revoke(&body.key_id, &session.organization_id).await {
        Ok(true) => {
            audit::emit(&AuditEvent::key_revoked(&session.organization_id, &body.key_id));
            Json(json!({"success": true})).into_response()
        }
        // Unknown and foreign keys look the same to the caller.
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "API key not found"})),
        )
            .into_response(),
        Err(e) => server_error(&e),
    }
}

#[allow(clippy::result_large_err)]
async fn require_session(
    state: &ApiKeyState,
    headers: &HeaderMap,
) -> Result<SessionContext, Response> {
    state.session.resolve(headers).await.ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized"})),
        )
            .into_response()
    })
}
