//! Bearer authentication for the brand data routes
//!
//! Accepts two credential families in `Authorization: Bearer <value>`:
//! - `bht_...` OAuth access tokens, resolved through the access token store
//! - `bh_...` organization API keys, resolved through the API key store
//!
//! The prefix decides which store is consulted; a value is never tried
//! against both. Every failure is a uniform `401` that names only the
//! credential family.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::api_keys::ApiKeyStore;
use crate::audit::{self, AuditEvent};
use crate::credentials::{CredentialKind, redact};
use crate::oauth::{AccessTokenStore, scope_contains};

/// Scope an OAuth access token needs to read brand data.
pub const BRAND_READ_SCOPE: &str = "brand:read";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Organization every downstream query is scoped to.
    pub organization_id: String,
    /// Which credential family authenticated the request.
    pub kind: CredentialKind,
    /// Granted scope; `None` for API keys, which carry full read access.
    pub scope: Option<String>,
}

impl Principal {
    /// Whether this principal may use `required`.
    #[must_use]
    pub fn has_scope(&self, required: &str) -> bool {
        match self.kind {
            CredentialKind::ApiKey => true,
            CredentialKind::OAuthToken => self
                .scope
                .as_deref()
                .is_some_and(|s| scope_contains(s, required)),
        }
    }
}

/// Why a request was not authenticated.
#[derive(Debug, Error)]
pub enum Rejection {
    /// No `Authorization: Bearer` header
    #[error("Missing Authorization header. Use: Authorization: Bearer <token>")]
    MissingHeader,

    /// Bearer value with an unknown prefix
    #[error("Unsupported credential")]
    UnsupportedCredential,

    /// Unknown or expired access token
    #[error("Invalid or expired access token")]
    InvalidAccessToken,

    /// Unknown or revoked API key
    #[error("Invalid or inactive API key")]
    InvalidApiKey,

    /// A store failed; rendered as a generic 500
    #[error("Authentication backend failure: {0}")]
    Server(#[from] crate::Error),
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        if let Self::Server(ref e) = self {
            error!(error = %e, "Authentication backend failure");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "server_error"})),
            )
                .into_response();
        }

        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({"error": self.to_string()})),
        )
            .into_response()
    }
}

/// Extract the credential from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; an empty credential is treated
/// as missing.
#[must_use]
pub fn bearer_value(header: &str) -> Option<&str> {
    let (scheme, value) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Resolves bearer credentials to an organization.
pub struct Authenticator {
    tokens: Arc<AccessTokenStore>,
    keys: Arc<ApiKeyStore>,
}

impl Authenticator {
    /// Create an authenticator over the two credential stores.
    #[must_use]
    pub fn new(tokens: Arc<AccessTokenStore>, keys: Arc<ApiKeyStore>) -> Self {
        Self { tokens, keys }
    }

    /// Authenticate the raw `Authorization` header value.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, Rejection> {
        let value = header.and_then(bearer_value).ok_or(Rejection::MissingHeader)?;

        match CredentialKind::from_value(value) {
            Some(CredentialKind::OAuthToken) => {
                let token = self
                    .tokens
                    .resolve(value)
                    .await?
                    .ok_or(Rejection::InvalidAccessToken)?;
                Ok(Principal {
                    organization_id: token.organization_id,
                    kind: CredentialKind::OAuthToken,
                    scope: Some(token.scope),
                })
            }
            Some(CredentialKind::ApiKey) => {
                let organization_id = self
                    .keys
                    .validate(value)
                    .await?
                    .ok_or(Rejection::InvalidApiKey)?;
                Ok(Principal {
                    organization_id,
                    kind: CredentialKind::ApiKey,
                    scope: None,
                })
            }
            None => Err(Rejection::UnsupportedCredential),
        }
    }
}

/// Authentication middleware
///
/// On success the [`Principal`] is inserted into the request extensions.
/// OAuth tokens must also carry [`BRAND_READ_SCOPE`].
pub async fn auth_middleware(
    State(auth): State<Arc<Authenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let credential = authorization.as_deref().and_then(bearer_value).map(redact);

    let principal = match auth.authenticate(authorization.as_deref()).await {
        Ok(principal) => principal,
        Err(rejection) => {
            if !matches!(rejection, Rejection::Server(_)) {
                warn!(path = %path, reason = %rejection, "Authentication failed");
                let reason = match credential {
                    Some(c) => format!("{rejection} ({c})"),
                    None => rejection.to_string(),
                };
                audit::emit(&AuditEvent::denied(reason));
            }
            return rejection.into_response();
        }
    };

    if !principal.has_scope(BRAND_READ_SCOPE) {
        warn!(
            path = %path,
            organization_id = %principal.organization_id,
            "Access token lacks required scope"
        );
        audit::emit(&AuditEvent::denied(format!(
            "insufficient scope for {path}: {BRAND_READ_SCOPE} required"
        )));
        return insufficient_scope_response();
    }

    debug!(
        path = %path,
        organization_id = %principal.organization_id,
        kind = principal.kind.as_str(),
        "Authenticated request"
    );
    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// Create a 403 response for a token without the required scope
fn insufficient_scope_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        [(
            header::WWW_AUTHENTICATE,
            format!("Bearer error=\"insufficient_scope\", scope=\"{BRAND_READ_SCOPE}\""),
        )],
        Json(json!({"error": "insufficient_scope"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::InMemoryStore;

    fn authenticator() -> (Arc<AccessTokenStore>, Arc<ApiKeyStore>, Authenticator) {
        let tokens = Arc::new(AccessTokenStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        ));
        let keys = Arc::new(ApiKeyStore::in_memory());
        let auth = Authenticator::new(Arc::clone(&tokens), Arc::clone(&keys));
        (tokens, keys, auth)
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_value("Bearer bh_abc"), Some("bh_abc"));
        assert_eq!(bearer_value("bearer bh_abc"), Some("bh_abc"));
        assert_eq!(bearer_value("BEARER  bh_abc "), Some("bh_abc"));
        assert_eq!(bearer_value("Basic dXNlcg=="), None);
        assert_eq!(bearer_value("Bearer "), None);
        assert_eq!(bearer_value("bh_abc"), None);
    }

    #[tokio::test]
    async fn access_token_resolves_to_organization() {
        // GIVEN: an issued access token
        let (tokens, _, auth) = authenticator();
        let token = tokens.issue("org_1", "mcp_c", "brand:read").await.unwrap();

        // WHEN: authenticated
        let principal = auth
            .authenticate(Some(&format!("Bearer {}", token.token)))
            .await
            .unwrap();

        // THEN: org and scope come from the token
        assert_eq!(principal.organization_id, "org_1");
        assert_eq!(principal.kind, CredentialKind::OAuthToken);
        assert!(principal.has_scope(BRAND_READ_SCOPE));
    }

    #[tokio::test]
    async fn api_key_resolves_to_organization() {
        let (_, keys, auth) = authenticator();
        let created = keys.create("org_2", "k").await.unwrap();

        let principal = auth
            .authenticate(Some(&format!("Bearer {}", created.key)))
            .await
            .unwrap();

        assert_eq!(principal.organization_id, "org_2");
        assert_eq!(principal.kind, CredentialKind::ApiKey);
        assert!(principal.has_scope(BRAND_READ_SCOPE));
    }

    #[tokio::test]
    async fn failures_name_only_the_credential_family() {
        let (_, _, auth) = authenticator();

        assert!(matches!(
            auth.authenticate(None).await,
            Err(Rejection::MissingHeader)
        ));
        assert!(matches!(
            auth.authenticate(Some("Bearer bh_deadbeef")).await,
            Err(Rejection::InvalidApiKey)
        ));
        assert!(matches!(
            auth.authenticate(Some("Bearer bht_deadbeef")).await,
            Err(Rejection::InvalidAccessToken)
        ));
        assert!(matches!(
            auth.authenticate(Some("Bearer bhr_deadbeef")).await,
            Err(Rejection::UnsupportedCredential)
        ));
        assert_eq!(Rejection::InvalidApiKey.to_string(), "Invalid or inactive API key");
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        // GIVEN: a token store with zero access TTL
        let tokens = Arc::new(AccessTokenStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            Duration::ZERO,
            Duration::from_secs(60),
        ));
        let auth = Authenticator::new(Arc::clone(&tokens), Arc::new(ApiKeyStore::in_memory()));
        let token = tokens.issue("org_1", "mcp_c", "brand:read").await.unwrap();

        // WHEN/THEN: the token is already expired
        assert!(matches!(
            auth.authenticate(Some(&format!("Bearer {}", token.token))).await,
            Err(Rejection::InvalidAccessToken)
        ));
    }

    #[test]
    fn oauth_principal_without_brand_scope_is_insufficient() {
        let principal = Principal {
            organization_id: "org_1".to_string(),
            kind: CredentialKind::OAuthToken,
            scope: Some("personas:read".to_string()),
        };

        assert!(!principal.has_scope(BRAND_READ_SCOPE));
    }

    #[test]
    fn rejection_renders_401_with_challenge() {
        let response = Rejection::InvalidApiKey.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[test]
    fn server_rejection_renders_500() {
        let response = Rejection::Server(crate::Error::Storage("down".into())).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
