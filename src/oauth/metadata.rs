//! OAuth Authorization Server Metadata (RFC 8414)
//!
//! Published at `/.well-known/oauth-authorization-server` so agent platforms
//! can discover the authorize, token and registration endpoints.

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::{Error, Result};

/// OAuth Authorization Server Metadata (RFC 8414)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Authorization server issuer URL
    pub issuer: String,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// Dynamic client registration endpoint
    pub registration_endpoint: String,

    /// Supported grant types
    #[serde(default)]
    pub grant_types_supported: Vec<String>,

    /// Supported response types
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// Supported scopes (some clients send a space-separated string)
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes_supported: Vec<String>,

    /// Supported token endpoint auth methods
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

/// Deserialize scopes that may be either a string or array
fn deserialize_scopes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(s.split_whitespace().map(String::from).collect()),
        StringOrVec::Vec(v) => Ok(v),
    }
}

impl AuthorizationServerMetadata {
    /// Build the metadata document for an issuer base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is not an absolute URL.
    pub fn for_issuer(issuer: &str, scopes_supported: &[String]) -> Result<Self> {
        Url::parse(issuer).map_err(|e| Error::Config(format!("Invalid issuer URL {issuer}: {e}")))?;
        let base = issuer.trim_end_matches('/');

        Ok(Self {
            issuer: base.to_string(),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            registration_endpoint: format!("{base}/register"),
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            response_types_supported: vec!["code".to_string()],
            scopes_supported: scopes_supported.to_vec(),
            token_endpoint_auth_methods_supported: vec!["none".to_string()],
        })
    }
}
