//! Access token store.
//!
//! Access tokens (`bht_`) are looked up by raw value. Expiry is lazy: every
//! read checks `expires_at` and deletes the entry once it has passed, so an
//! expired token can never come back.
//!
//! Each access token is minted together with a refresh token (`bhr_`). A
//! refresh token is single use: redeeming it rotates both halves of the pair.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{expires_after, scope_contains};
use crate::credentials::{self, ACCESS_TOKEN_PREFIX, REFRESH_TOKEN_PREFIX, SECRET_BYTES, redact};
use crate::store::{ExpiringStore, KvStore};
use crate::Result;

/// Default access token lifetime.
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// An issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Bearer value (`bht_<64 hex>`).
    pub token: String,
    /// Organization the token reads on behalf of.
    pub organization_id: String,
    /// Client the token was issued to.
    pub client_id: String,
    /// Granted scope.
    pub scope: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Paired refresh token (`bhr_<64 hex>`).
    pub refresh_token: String,
}

impl AccessToken {
    /// Returns `true` once the token has reached its expiry instant.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Whole seconds until expiry, zero if already expired.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        u64::try_from((self.expires_at - Utc::now()).num_seconds()).unwrap_or(0)
    }
}

/// Server-side record behind a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshGrant {
    /// Refresh token value.
    pub refresh_token: String,
    /// Access token minted alongside it.
    pub access_token: String,
    /// Owning organization.
    pub organization_id: String,
    /// Client the grant is bound to.
    pub client_id: String,
    /// Granted scope.
    pub scope: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

impl RefreshGrant {
    /// Returns `true` once the grant has reached its expiry instant.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Store of issued access tokens and their refresh grants.
pub struct AccessTokenStore {
    tokens: Arc<dyn KvStore<AccessToken>>,
    refresh_grants: Arc<dyn KvStore<RefreshGrant>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AccessTokenStore {
    /// Create a token store.
    #[must_use]
    pub fn new(
        tokens: Arc<dyn KvStore<AccessToken>>,
        refresh_grants: Arc<dyn KvStore<RefreshGrant>>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            tokens,
            refresh_grants,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Configured access token lifetime.
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Mint an access token and its refresh token.
    pub async fn issue(
        &self,
        organization_id: &str,
        client_id: &str,
        scope: &str,
    ) -> Result<AccessToken> {
        let token = AccessToken {
            token: credentials::generate(SECRET_BYTES, Some(ACCESS_TOKEN_PREFIX)),
            organization_id: organization_id.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            expires_at: expires_after(self.access_ttl),
            refresh_token: credentials::generate(SECRET_BYTES, Some(REFRESH_TOKEN_PREFIX)),
        };
        let grant = RefreshGrant {
            refresh_token: token.refresh_token.clone(),
            access_token: token.token.clone(),
            organization_id: token.organization_id.clone(),
            client_id: token.client_id.clone(),
            scope: token.scope.clone(),
            expires_at: expires_after(self.refresh_ttl),
        };

        self.refresh_grants.put(&grant.refresh_token.clone(), grant).await?;
        self.tokens.put(&token.token, token.clone()).await?;
        Ok(token)
    }

    /// Look up a live token record. Expired entries are deleted on sight.
    pub async fn resolve(&self, token: &str) -> Result<Option<AccessToken>> {
        let Some(entry) = self.tokens.get(token).await? else {
            return Ok(None);
        };

        if entry.is_expired() {
            self.tokens.delete(token).await?;
            debug!(token = %redact(token), "Lazy-evicted expired access token");
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Resolve a bearer value to its organization ID.
    pub async fn validate(&self, token: &str) -> Result<Option<String>> {
        Ok(self.resolve(token).await?.map(|t| t.organization_id))
    }

    /// Whether a live token carries `required` among its scopes.
    pub async fn check_scope(&self, token: &str, required: &str) -> Result<bool> {
        Ok(self
            .resolve(token)
            .await?
            .is_some_and(|t| scope_contains(&t.scope, required)))
    }

    /// Redeem a refresh token for a new access/refresh pair.
    ///
    /// The grant is taken atomically, so a refresh token works once. Returns
    /// `None` if it is unknown, expired, or was issued to a different client.
    /// The access token minted with the old grant is revoked.
    ///
    /// The client binding is checked after the take, so a presentation by the
    /// wrong client also burns the grant and the rightful client must
    /// re-authorize. Authorization codes behave the same way.
    pub async fn refresh(&self, refresh_token: &str, client_id: &str) -> Result<Option<AccessToken>> {
        let Some(grant) = self.refresh_grants.take(refresh_token).await? else {
            return Ok(None);
        };

        if grant.is_expired() || grant.client_id != client_id {
            debug!(
                refresh_token = %redact(refresh_token),
                expired = grant.is_expired(),
                "Refresh token rejected"
            );
            return Ok(None);
        }

        self.tokens.delete(&grant.access_token).await?;
        self.issue(&grant.organization_id, &grant.client_id, &grant.scope)
            .await
            .map(Some)
    }
}

#[async_trait]
impl ExpiringStore for AccessTokenStore {
    fn name(&self) -> &'static str {
        "access_tokens"
    }

    async fn purge_expired(&self) -> Result<usize> {
        let tokens = self
            .tokens
            .retain(&|t: &AccessToken| !t.is_expired())
            .await?;
        let grants = self
            .refresh_grants
            .retain(&|g: &RefreshGrant| !g.is_expired())
            .await?;
        Ok(tokens + grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    struct Fixture {
        tokens: Arc<InMemoryStore<AccessToken>>,
        grants: Arc<InMemoryStore<RefreshGrant>>,
        store: AccessTokenStore,
    }

    fn fixture(access_ttl: Duration, refresh_ttl: Duration) -> Fixture {
        let tokens = Arc::new(InMemoryStore::new());
        let grants = Arc::new(InMemoryStore::new());
        let store = AccessTokenStore::new(tokens.clone(), grants.clone(), access_ttl, refresh_ttl);
        Fixture {
            tokens,
            grants,
            store,
        }
    }

    fn default_fixture() -> Fixture {
        fixture(DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_REFRESH_TOKEN_TTL)
    }

    #[tokio::test]
    async fn issue_mints_prefixed_pair() {
        let f = default_fixture();

        let token = f.store.issue("org_1", "mcp_c", "brand:read").await.unwrap();

        assert!(token.token.starts_with("bht_"));
        assert!(token.refresh_token.starts_with("bhr_"));
        assert_eq!(token.token.len(), 4 + 64);
        assert!(token.expires_in() > 3500 && token.expires_in() <= 3600);
        assert_eq!(f.tokens.len(), 1);
        assert_eq!(f.grants.len(), 1);
    }

    #[tokio::test]
    async fn validate_returns_organization() {
        let f = default_fixture();
        let token = f.store.issue("org_1", "mcp_c", "brand:read").await.unwrap();

        let org = f.store.validate(&token.token).await.unwrap();

        assert_eq!(org.as_deref(), Some("org_1"));
        assert!(f.store.validate("bht_unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_token_is_evicted_and_stays_gone() {
        // GIVEN: a token that expires immediately
        let f = fixture(Duration::ZERO, DEFAULT_REFRESH_TOKEN_TTL);
        let token = f.store.issue("org_1", "mcp_c", "brand:read").await.unwrap();

        // WHEN: validated twice
        let first = f.store.validate(&token.token).await.unwrap();
        let second = f.store.validate(&token.token).await.unwrap();

        // THEN: both fail and the entry is gone
        assert!(first.is_none());
        assert!(second.is_none());
        assert!(f.tokens.is_empty());
    }

    #[tokio::test]
    async fn check_scope_is_token_membership() {
        let f = default_fixture();
        let token = f
            .store
            .issue("org_1", "mcp_c", "brand:read personas:read")
            .await
            .unwrap();

        assert!(f.store.check_scope(&token.token, "brand:read").await.unwrap());
        assert!(f.store.check_scope(&token.token, "personas:read").await.unwrap());
        assert!(!f.store.check_scope(&token.token, "brand:write").await.unwrap());
        assert!(!f.store.check_scope("bht_missing", "brand:read").await.unwrap());
    }

    #[tokio::test]
    async fn refresh_rotates_pair_once() {
        // GIVEN: an issued pair
        let f = default_fixture();
        let original = f.store.issue("org_1", "mcp_c", "brand:read").await.unwrap();

        // WHEN: refreshed, then the same refresh token replayed
        let rotated = f
            .store
            .refresh(&original.refresh_token, "mcp_c")
            .await
            .unwrap()
            .unwrap();
        let replay = f.store.refresh(&original.refresh_token, "mcp_c").await.unwrap();

        // THEN: new pair for the same org/scope, old access token revoked, replay fails
        assert_ne!(rotated.token, original.token);
        assert_ne!(rotated.refresh_token, original.refresh_token);
        assert_eq!(rotated.organization_id, "org_1");
        assert_eq!(rotated.scope, "brand:read");
        assert!(f.store.validate(&original.token).await.unwrap().is_none());
        assert_eq!(
            f.store.validate(&rotated.token).await.unwrap().as_deref(),
            Some("org_1")
        );
        assert!(replay.is_none());
    }

    #[tokio::test]
    async fn refresh_is_bound_to_client() {
        let f = default_fixture();
        let original = f.store.issue("org_1", "mcp_c", "brand:read").await.unwrap();

        let stolen = f.store.refresh(&original.refresh_token, "mcp_other").await.unwrap();

        assert!(stolen.is_none());
        assert!(f.grants.is_empty());
        // The grant is burned for the rightful client too
        let rightful = f.store.refresh(&original.refresh_token, "mcp_c").await.unwrap();
        assert!(rightful.is_none());
    }

    #[tokio::test]
    async fn refresh_rejects_expired_grant() {
        let f = fixture(DEFAULT_ACCESS_TOKEN_TTL, Duration::ZERO);
        let original = f.store.issue("org_1", "mcp_c", "brand:read").await.unwrap();

        assert!(
            f.store
                .refresh(&original.refresh_token, "mcp_c")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn purge_removes_expired_tokens_and_grants() {
        let f = fixture(Duration::ZERO, Duration::ZERO);
        f.store.issue("org_1", "mcp_c", "brand:read").await.unwrap();
        f.store.issue("org_2", "mcp_c", "brand:read").await.unwrap();

        let purged = f.store.purge_expired().await.unwrap();

        assert_eq!(purged, 4);
        assert!(f.tokens.is_empty());
        assert!(f.grants.is_empty());
    }
}
