//! OAuth 2.0 Authorization Server for AI agent connectors
//!
//! Implements the authorization-code grant that lets external agents read an
//! organization's brand data on a member's behalf:
//!
//! 1. **Discovery**: RFC 8414 metadata at `/.well-known/oauth-authorization-server`.
//! 2. **Registration**: RFC 7591 dynamic registration of public clients (`POST /register`).
//! 3. **Authorization**: a signed-in organization member approves (`GET /authorize`)
//!    and the client receives a single-use code on its redirect URI.
//! 4. **Token exchange**: `POST /token` trades the code (or a refresh token)
//!    for a `bht_` access token.
//!
//! Every credential is bound to exactly one organization; the organization ID
//! is the only identity downstream handlers ever see.

pub mod codes;
pub mod handler;
pub mod metadata;
pub mod registration;
pub mod tokens;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::OAuthConfig;
use crate::session::SessionResolver;
use crate::store::{ExpiringStore, InMemoryStore};
use crate::Result;

pub use codes::{AuthorizationCode, AuthorizationCodeStore};
pub use handler::oauth_routes;
pub use metadata::AuthorizationServerMetadata;
pub use registration::{ClientRegistration, RegistrationRequest, RegistrationStore};
pub use tokens::{AccessToken, AccessTokenStore, RefreshGrant};

/// Instant `ttl` from now, saturating at the maximum representable time.
pub(crate) fn expires_after(ttl: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whether a space-separated scope string contains `required` as one of its tokens.
#[must_use]
pub fn scope_contains(scope: &str, required: &str) -> bool {
    scope.split_whitespace().any(|s| s == required)
}

/// The authorization server: registration, code and token stores plus the
/// session hand-off used by the authorize endpoint.
pub struct OAuthServer {
    /// Registered clients
    pub registrations: RegistrationStore,
    /// Outstanding authorization codes
    pub codes: Arc<AuthorizationCodeStore>,
    /// Issued access tokens and refresh grants
    pub tokens: Arc<AccessTokenStore>,
    /// Session context supplied by the upstream session system
    pub session: Arc<dyn SessionResolver>,
    /// Published metadata document
    pub metadata: AuthorizationServerMetadata,
}

impl OAuthServer {
    /// Create an authorization server with in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured issuer is not an absolute URL.
    pub fn new(config: &OAuthConfig, session: Arc<dyn SessionResolver>) -> Result<Self> {
        let metadata = AuthorizationServerMetadata::for_issuer(&config.issuer, &config.scopes_supported)?;

        Ok(Self {
            registrations: RegistrationStore::new(Arc::new(InMemoryStore::new())),
            codes: Arc::new(AuthorizationCodeStore::new(
                Arc::new(InMemoryStore::new()),
                config.code_ttl,
            )),
            tokens: Arc::new(AccessTokenStore::new(
                Arc::new(InMemoryStore::new()),
                Arc::new(InMemoryStore::new()),
                config.access_token_ttl,
                config.refresh_token_ttl,
            )),
            session,
            metadata,
        })
    }

    /// Stores swept by the optional reaper.
    #[must_use]
    pub fn expiring_stores(&self) -> Vec<Arc<dyn ExpiringStore>> {
        vec![
            Arc::clone(&self.codes) as Arc<dyn ExpiringStore>,
            Arc::clone(&self.tokens) as Arc<dyn ExpiringStore>,
        ]
    }

    /// Whether every scope in `requested` is advertised by this server.
    #[must_use]
    pub fn supports_scope(&self, requested: &str) -> bool {
        requested
            .split_whitespace()
            .all(|s| self.metadata.scopes_supported.iter().any(|known| known == s))
    }
}
