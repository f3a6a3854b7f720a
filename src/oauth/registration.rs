//! Dynamic client registration (RFC 7591).
//!
//! Clients are public: no secret is issued, and a registration is immutable
//! and never expires. The `client_id` is the only durable reference.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::credentials::{self, CLIENT_ID_BYTES, CLIENT_ID_PREFIX};
use crate::store::KvStore;
use crate::{Error, Result};

/// Scope granted when a registration does not ask for one.
pub const DEFAULT_SCOPE: &str = "brand:read";

/// A registered OAuth client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    /// Generated client identifier (`mcp_<32 hex>`).
    pub client_id: String,
    /// Display name supplied by the client.
    pub client_name: Option<String>,
    /// Allowed redirect targets, each HTTPS or loopback.
    pub redirect_uris: Vec<String>,
    /// Grant types the client may use.
    pub grant_types: Vec<String>,
    /// Response types the client may request.
    pub response_types: Vec<String>,
    /// Space-separated scope.
    pub scope: String,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl ClientRegistration {
    /// Whether `uri` is one of this client's registered redirect URIs.
    #[must_use]
    pub fn allows_redirect(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }
}

/// Registration request body; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    /// Display name.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Redirect URIs (default: none).
    #[serde(default)]
    pub redirect_uris: Option<Vec<String>>,
    /// Grant types (default: `["authorization_code"]`).
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
    /// Response types (default: `["code"]`).
    #[serde(default)]
    pub response_types: Option<Vec<String>>,
    /// Scope (default: `brand:read`).
    #[serde(default)]
    pub scope: Option<String>,
}

/// Check that a redirect URI parses and is either HTTPS or points at a
/// loopback host (`localhost` / `127.0.0.1`).
pub fn validate_redirect_uri(uri: &str) -> Result<Url> {
    let url = Url::parse(uri).map_err(|e| Error::InvalidRedirectUri(format!("{uri}: {e}")))?;

    let loopback = match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        _ => false,
    };

    if url.scheme() == "https" || loopback {
        Ok(url)
    } else {
        Err(Error::InvalidRedirectUri(format!(
            "{uri}: must use https or a loopback host"
        )))
    }
}

/// Store of registered clients.
pub struct RegistrationStore {
    clients: Arc<dyn KvStore<ClientRegistration>>,
}

impl RegistrationStore {
    /// Create a registration store over the given backend.
    #[must_use]
    pub fn new(clients: Arc<dyn KvStore<ClientRegistration>>) -> Self {
        Self { clients }
    }

    /// Validate and persist a new client registration.
    ///
    /// Rejects the whole request on the first bad redirect URI; nothing is
    /// stored in that case.
    pub async fn register(&self, request: RegistrationRequest) -> Result<ClientRegistration> {
        let redirect_uris = request.redirect_uris.unwrap_or_default();
        for uri in &redirect_uris {
            validate_redirect_uri(uri)?;
        }

        let registration = ClientRegistration {
            client_id: credentials::generate(CLIENT_ID_BYTES, Some(CLIENT_ID_PREFIX)),
            client_name: request.client_name,
            redirect_uris,
            grant_types: request
                .grant_types
                .unwrap_or_else(|| vec!["authorization_code".to_string()]),
            response_types: request
                .response_types
                .unwrap_or_else(|| vec!["code".to_string()]),
            scope: request.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            created_at: Utc::now(),
        };

        self.clients
            .put(&registration.client_id, registration.clone())
            .await?;
        Ok(registration)
    }

    /// Look up a registration by client ID.
    pub async fn get(&self, client_id: &str) -> Result<Option<ClientRegistration>> {
        self.clients.get(client_id).await
    }
}
