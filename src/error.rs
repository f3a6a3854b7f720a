//! Error types for the BrandHalo gateway

use std::io;

use thiserror::Error;

/// Result type alias for the BrandHalo gateway
pub type Result<T> = std::result::Result<T, Error>;

/// BrandHalo gateway errors
///
/// Expected credential outcomes (absent, expired, revoked, consumed) are never
/// errors; stores report them as `None`/`false`. Only validation failures that
/// the caller must surface and infrastructure failures end up here.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A redirect URI is not HTTPS and not loopback, or does not parse
    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    /// Unknown or malformed OAuth client
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// Authorization request asked for something other than `response_type=code`
    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// OAuth 2.0 error code for this error (RFC 6749 §4.1.2.1 / RFC 7591 §3.2.2)
    #[must_use]
    pub fn oauth_code(&self) -> &'static str {
        match self {
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::InvalidClient(_) => "invalid_client",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            _ => "server_error",
        }
    }

    /// Whether this error is an infrastructure failure rather than bad input
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.oauth_code() == "server_error"
    }
}
