//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info};

use super::auth::{Authenticator, Principal, auth_middleware};
use crate::api_keys::{ApiKeyStore, api_key_routes, handler::ApiKeyState};
use crate::brand::{BrandRepository, StaticBrandRepository};
use crate::config::Config;
use crate::oauth::handler::server_error;
use crate::oauth::{OAuthServer, oauth_routes};
use crate::session::{HeaderSessionResolver, SessionResolver};
use crate::Result;

/// Shared application state
pub struct AppState {
    /// Authorization server (registration, codes, tokens)
    pub oauth: Arc<OAuthServer>,
    /// Organization API keys
    pub keys: Arc<ApiKeyStore>,
    /// Bearer authentication for the data routes
    pub authenticator: Arc<Authenticator>,
    /// Organization session hand-off
    pub session: Arc<dyn SessionResolver>,
    /// Brand data collaborator
    pub brand: Arc<dyn BrandRepository>,
}

impl AppState {
    /// Assemble stores and collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver = HeaderSessionResolver::from_config(&config.session)?;
        if !resolver.is_guarded() {
            info!("Session headers are trusted without a shared secret");
        }
        let session: Arc<dyn SessionResolver> = Arc::new(resolver);

        let brand: Arc<dyn BrandRepository> = match config.data.file {
            Some(ref path) => Arc::new(StaticBrandRepository::load(path)?),
            None => {
                debug!("No brand data file configured");
                Arc::new(StaticBrandRepository::empty())
            }
        };

        Ok(Self::new(
            Arc::new(OAuthServer::new(&config.oauth, Arc::clone(&session))?),
            Arc::new(ApiKeyStore::in_memory()),
            session,
            brand,
        ))
    }

    /// Assemble state from prebuilt parts.
    #[must_use]
    pub fn new(
        oauth: Arc<OAuthServer>,
        keys: Arc<ApiKeyStore>,
        session: Arc<dyn SessionResolver>,
        brand: Arc<dyn BrandRepository>,
    ) -> Self {
        let authenticator = Arc::new(Authenticator::new(
            Arc::clone(&oauth.tokens),
            Arc::clone(&keys),
        ));
        Self {
            oauth,
            keys,
            authenticator,
            session,
            brand,
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let data = Router::new()
        .route("/api/brand", get(brand_handler))
        .route("/api/personas", get(personas_handler))
        .route("/api/voices", get(voices_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.authenticator),
            auth_middleware,
        ))
        .with_state(Arc::clone(&state));

    let keys = api_key_routes(Arc::new(ApiKeyState {
        keys: Arc::clone(&state.keys),
        session: Arc::clone(&state.session),
    }));

    Router::new()
        .route("/health", get(health_handler))
        .merge(oauth_routes(Arc::clone(&state.oauth)))
        .merge(keys)
        .merge(data)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/brand
async fn brand_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.brand.brand_profile(&principal.organization_id).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Brand profile not found"})),
        )
            .into_response(),
        Err(e) => server_error(&e),
    }
}

/// GET /api/personas
async fn personas_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.brand.personas(&principal.organization_id).await {
        Ok(personas) => Json(json!({ "personas": personas })).into_response(),
        Err(e) => server_error(&e),
    }
}

/// GET /api/voices
async fn voices_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.brand.voices(&principal.organization_id).await {
        Ok(voices) => Json(json!({ "voices": voices })).into_response(),
        Err(e) => server_error(&e),
    }
}
