//! Credential primitives: random identifier generation, API key hashing and
//! prefix-based credential classification.
//!
//! Every secret the gateway hands out carries a short prefix so it is
//! greppable, detectable by secret scanners, and so the authenticator can
//! tell which store validates it without touching either store:
//!
//! | Prefix | Credential |
//! |--------|------------|
//! | `bht_` | OAuth access token |
//! | `bhr_` | OAuth refresh token |
//! | `bh_`  | API key |
//! | `mcp_` | Dynamically registered client ID |

use rand::RngExt;
use sha2::{Digest, Sha256};

/// Prefix of OAuth access tokens.
pub const ACCESS_TOKEN_PREFIX: &str = "bht_";
/// Prefix of OAuth refresh tokens.
pub const REFRESH_TOKEN_PREFIX: &str = "bhr_";
/// Prefix of organization API keys.
pub const API_KEY_PREFIX: &str = "bh_";
/// Prefix of dynamically registered client IDs.
pub const CLIENT_ID_PREFIX: &str = "mcp_";

/// Random bytes in a client ID.
pub const CLIENT_ID_BYTES: usize = 16;
/// Random bytes in secrets (codes, tokens, API keys).
pub const SECRET_BYTES: usize = 32;

/// Generate `byte_len` bytes from the thread-local CSPRNG, hex-encoded
/// (lower-case) and optionally prefixed.
#[must_use]
pub fn generate(byte_len: usize, prefix: Option<&str>) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..byte_len).map(|_| rng.random::<u8>()).collect();
    let encoded = hex::encode(bytes);
    match prefix {
        Some(p) => format!("{p}{encoded}"),
        None => encoded,
    }
}

/// One-way SHA-256 digest of a plaintext API key, lower-case hex.
///
/// Deterministic, so the digest doubles as the lookup key.
#[must_use]
pub fn hash_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Kind of bearer credential, decided once from the value's prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// `bht_...` access token issued through the OAuth flow
    OAuthToken,
    /// `bh_...` organization API key
    ApiKey,
}

impl CredentialKind {
    /// Classify a bearer value. Returns `None` for unknown prefixes.
    ///
    /// `bht_` is checked first: it also starts with `bh`, but never with
    /// `bh_`, so the two prefixes cannot both match.
    #[must_use]
    pub fn from_value(value: &str) -> Option<Self> {
        if value.starts_with(ACCESS_TOKEN_PREFIX) {
            Some(Self::OAuthToken)
        } else if value.starts_with(API_KEY_PREFIX) {
            Some(Self::ApiKey)
        } else {
            None
        }
    }

    /// Short label used in logs and audit events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OAuthToken => "oauth_token",
            Self::ApiKey => "api_key",
        }
    }
}

/// Non-reversible display form of a secret for logs: prefix plus the first
/// four characters of the random part.
#[must_use]
pub fn redact(secret: &str) -> String {
    let split = secret.find('_').map_or(0, |i| i + 1);
    let (prefix, rest) = secret.split_at(split);
    let visible: String = rest.chars().take(4).collect();
    format!("{prefix}{visible}…")
}
