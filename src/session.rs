//! Organization session hand-off.
//!
//! Member sign-in and organization switching live in an external session
//! system in front of this gateway. For browser-facing routes (`/authorize`,
//! `/keys`) that system forwards the active organization and user as trusted
//! request headers. When a shared secret is configured, the forwarding proxy
//! must also present it, and it is compared in constant time.

use async_trait::async_trait;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::Result;
use crate::config::SessionConfig;

/// Verified member context for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Active organization of the signed-in member.
    pub organization_id: String,
    /// Signed-in user, when the session system provides it.
    pub user_id: Option<String>,
}

/// Resolves the organization session attached to a request.
#[async_trait]
pub trait SessionResolver: Send + Sync + 'static {
    /// Return the session context, or `None` if the request carries no valid
    /// organization-scoped session.
    async fn resolve(&self, headers: &HeaderMap) -> Option<SessionContext>;
}

/// Reads the session context from headers injected by a trusted proxy.
#[derive(Debug, Clone)]
pub struct HeaderSessionResolver {
    organization_header: String,
    user_header: String,
    secret_header: String,
    shared_secret: Option<String>,
}

impl HeaderSessionResolver {
    /// Build a resolver from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the shared secret cannot be resolved.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            organization_header: config.organization_header.to_ascii_lowercase(),
            user_header: config.user_header.to_ascii_lowercase(),
            secret_header: config.secret_header.to_ascii_lowercase(),
            shared_secret: config.resolve_shared_secret()?,
        })
    }

    /// Whether a shared secret guards the session headers.
    #[must_use]
    pub fn is_guarded(&self) -> bool {
        self.shared_secret.is_some()
    }

    fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl SessionResolver for HeaderSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Option<SessionContext> {
        if let Some(ref expected) = self.shared_secret {
            let provided = Self::header(headers, &self.secret_header).unwrap_or_default();
            let matches: bool = provided.as_bytes().ct_eq(expected.as_bytes()).into();
            if !matches {
                debug!("Session headers rejected: shared secret mismatch");
                return None;
            }
        }

        let organization_id = Self::header(headers, &self.organization_header)?;
        Some(SessionContext {
            organization_id: organization_id.to_string(),
            user_id: Self::header(headers, &self.user_header).map(str::to_string),
        })
    }
}
