//! Audit logging for credential lifecycle events.
//!
//! Every event is emitted via `tracing::info!` with the event serialized as
//! JSON in the `audit` field, so the trail is queryable by any log aggregator.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `client.registered` | A client completed dynamic registration |
//! | `code.issued` | An organization member approved an authorization request |
//! | `code.redeemed` | An authorization code was exchanged at the token endpoint |
//! | `token.issued` | An access/refresh token pair was minted |
//! | `token.refreshed` | A refresh token was rotated into a new pair |
//! | `key.created` | An API key was minted |
//! | `key.revoked` | An API key was deactivated |
//! | `auth.denied` | A bearer credential was rejected |
//!
//! Secrets never appear in events; only redacted forms do.

use serde::Serialize;

use crate::credentials::redact;

/// Structured audit event emitted for every credential lifecycle transition.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"token.issued"`).
    pub event: &'static str,
    /// Organization that owns the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// OAuth client involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Redacted credential value or API key record id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Human-readable reason for denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn new(event: &'static str) -> Self {
        Self {
            event,
            organization_id: None,
            client_id: None,
            credential: None,
            scope: None,
            reason: None,
        }
    }

    /// Construct a `client.registered` event.
    #[must_use]
    pub fn client_registered(client_id: &str, scope: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            scope: Some(scope.to_string()),
            ..Self::new("client.registered")
        }
    }

    /// Construct a `code.issued` event.
    #[must_use]
    pub fn code_issued(organization_id: &str, client_id: &str, code: &str) -> Self {
        Self {
            organization_id: Some(organization_id.to_string()),
            client_id: Some(client_id.to_string()),
            credential: Some(redact(code)),
            ..Self::new("code.issued")
        }
    }

    /// Construct a `code.redeemed` event.
    #[must_use]
    pub fn code_redeemed(organization_id: &str, client_id: &str) -> Self {
        Self {
            organization_id: Some(organization_id.to_string()),
            client_id: Some(client_id.to_string()),
            ..Self::new("code.redeemed")
        }
    }

    /// Construct a `token.issued` event.
    #[must_use]
    pub fn token_issued(organization_id: &str, client_id: &str, token: &str, scope: &str) -> Self {
        Self {
            organization_id: Some(organization_id.to_string()),
            client_id: Some(client_id.to_string()),
            credential: Some(redact(token)),
            scope: Some(scope.to_string()),
            ..Self::new("token.issued")
        }
    }

    /// Construct a `token.refreshed` event.
    #[must_use]
    pub fn token_refreshed(organization_id: &str, client_id: &str, token: &str) -> Self {
        Self {
            organization_id: Some(organization_id.to_string()),
            client_id: Some(client_id.to_string()),
            credential: Some(redact(token)),
            ..Self::new("token.refreshed")
        }
    }

    /// Construct a `key.created` event.
    #[must_use]
    pub fn key_created(organization_id: &str, key_id: &str) -> Self {
        Self {
            organization_id: Some(organization_id.to_string()),
            credential: Some(key_id.to_string()),
            ..Self::new("key.created")
        }
    }

    /// Construct a `key.revoked` event.
    #[must_use]
    pub fn key_revoked(organization_id: &str, key_id: &str) -> Self {
        Self {
            organization_id: Some(organization_id.to_string()),
            credential: Some(key_id.to_string()),
            ..Self::new("key.revoked")
        }
    }

    /// Construct an `auth.denied` event.
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new("auth.denied")
        }
    }
}

/// Emit an audit event via `tracing::info!`.
///
/// ```text
/// INFO brandhalo_gateway::audit audit={"event":"token.issued",...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "credential audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
