//! Authorization code store.
//!
//! Codes are short-lived (10 minutes by default) and single use. Redemption
//! goes through [`KvStore::take`], so the entry is gone before the caller
//! sees it and a replayed code finds nothing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::expires_after;
use crate::credentials::{self, SECRET_BYTES, redact};
use crate::store::{ExpiringStore, KvStore};
use crate::Result;

/// Default authorization code lifetime.
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// An authorization code awaiting exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Code value (64 hex characters).
    pub code: String,
    /// Organization the approving member acted for.
    pub organization_id: String,
    /// Client the code was issued to.
    pub client_id: String,
    /// Redirect URI the code was delivered to.
    pub redirect_uri: String,
    /// Approved scope.
    pub scope: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    /// Returns `true` once the code has reached its expiry instant.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Store of outstanding authorization codes.
pub struct AuthorizationCodeStore {
    codes: Arc<dyn KvStore<AuthorizationCode>>,
    ttl: Duration,
}

impl AuthorizationCodeStore {
    /// Create a code store with the given code lifetime.
    #[must_use]
    pub fn new(codes: Arc<dyn KvStore<AuthorizationCode>>, ttl: Duration) -> Self {
        Self { codes, ttl }
    }

    /// Mint a code for an approved authorization request.
    ///
    /// The caller has already checked the response type, the client and the
    /// member's organization session.
    pub async fn issue(
        &self,
        organization_id: &str,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<AuthorizationCode> {
        let code = AuthorizationCode {
            code: credentials::generate(SECRET_BYTES, None),
            organization_id: organization_id.to_string(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            expires_at: expires_after(self.ttl),
        };
        self.codes.put(&code.code, code.clone()).await?;
        Ok(code)
    }

    /// Redeem a code. Succeeds at most once per code.
    ///
    /// Returns `None` if the code is unknown, already redeemed, or expired.
    /// An expired code is deleted as a side effect.
    pub async fn consume(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let Some(entry) = self.codes.take(code).await? else {
            return Ok(None);
        };

        if entry.is_expired() {
            debug!(code = %redact(code), "Discarded expired authorization code");
            return Ok(None);
        }

        Ok(Some(entry))
    }
}

#[async_trait]
impl ExpiringStore for AuthorizationCodeStore {
    fn name(&self) -> &'static str {
        "authorization_codes"
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.codes.retain(&|code: &AuthorizationCode| !code.is_expired()).await
    }
}
