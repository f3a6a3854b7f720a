//! Organization API keys.
//!
//! A long-lived alternative to OAuth for simple integrations. The plaintext
//! key (`bh_<64 hex>`) is returned once, at creation; only its SHA-256 digest
//! is stored, and the digest is the lookup key. Revoked keys stay in storage
//! with `is_active = false` and are rejected exactly like unknown keys.
//!
//! Records are indexed twice:
//!
//! - `by_hash`: key digest → [`ApiKey`]   (O(1) validation)
//! - `by_id`:   record id  → key digest   (O(1) revocation)

pub mod handler;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::credentials::{self, API_KEY_PREFIX, SECRET_BYTES, hash_key};
use crate::store::{InMemoryStore, KvStore};
use crate::Result;

pub use handler::api_key_routes;

/// Stored API key record. Never leaves the process as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Record id (UUID v4).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// SHA-256 of the plaintext key.
    pub key_hash: String,
    /// Label chosen by the creator.
    pub name: String,
    /// Last successful authentication.
    pub last_used: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// `false` once revoked.
    pub is_active: bool,
}

/// Listing view of a key: no digest, no plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    /// Record id.
    pub id: String,
    /// Label.
    pub name: String,
    /// Last successful authentication.
    pub last_used: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// `false` once revoked.
    pub is_active: bool,
}

impl From<ApiKey> for ApiKeySummary {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            last_used: key.last_used,
            created_at: key.created_at,
            is_active: key.is_active,
        }
    }
}

/// Result of key creation; the only place the plaintext key ever appears.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedApiKey {
    /// Record id.
    pub id: String,
    /// Label.
    pub name: String,
    /// Plaintext key, shown once.
    pub key: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Store of organization API keys.
pub struct ApiKeyStore {
    by_hash: Arc<dyn KvStore<ApiKey>>,
    by_id: Arc<dyn KvStore<String>>,
}

impl ApiKeyStore {
    /// Create a key store over the given backends.
    #[must_use]
    pub fn new(by_hash: Arc<dyn KvStore<ApiKey>>, by_id: Arc<dyn KvStore<String>>) -> Self {
        Self { by_hash, by_id }
    }

    /// Create a key store with in-memory backends.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryStore::new()))
    }

    /// Mint a key for an organization.
    pub async fn create(&self, organization_id: &str, name: &str) -> Result<CreatedApiKey> {
        let plaintext = credentials::generate(SECRET_BYTES, Some(API_KEY_PREFIX));
        let record = ApiKey {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            key_hash: hash_key(&plaintext),
            name: name.to_string(),
            last_used: None,
            created_at: Utc::now(),
            is_active: true,
        };

        // Index first: a key that validates must always be revocable.
        self.by_id.put(&record.id, record.key_hash.clone()).await?;
        if let Err(e) = self.by_hash.put(&record.key_hash, record.clone()).await {
            if let Err(cleanup) = self.by_id.delete(&record.id).await {
                warn!(key_id = %record.id, error = %cleanup, "Failed to drop orphaned API key index");
            }
            return Err(e);
        }

        Ok(CreatedApiKey {
            id: record.id,
            name: record.name,
            key: plaintext,
            created_at: record.created_at,
        })
    }

    /// Resolve a plaintext key to its organization ID.
    ///
    /// Values without the `bh_` prefix are rejected before hashing. Unknown
    /// and revoked keys both yield `None`. A successful lookup stamps
    /// `last_used`; failing to stamp it is logged, not returned.
    pub async fn validate(&self, plaintext: &str) -> Result<Option<String>> {
        if !plaintext.starts_with(API_KEY_PREFIX) {
            return Ok(None);
        }

        let hash = hash_key(plaintext);
        let Some(record) = self.by_hash.get(&hash).await? else {
            return Ok(None);
        };
        if !record.is_active {
            return Ok(None);
        }

        if let Err(e) = self.touch_last_used(&hash).await {
            warn!(key_id = %record.id, error = %e, "Failed to update API key last_used");
        }

        Ok(Some(record.organization_id))
    }

    /// Stamp `last_used` on a key.
    pub async fn touch_last_used(&self, key_hash: &str) -> Result<bool> {
        let now = Utc::now();
        self.by_hash
            .update(key_hash, &move |key: &mut ApiKey| {
                key.last_used = Some(now);
                true
            })
            .await
    }

    /// Keys of an organization, newest first.
    pub async fn list(&self, organization_id: &str) -> Result<Vec<ApiKeySummary>> {
        let mut keys: Vec<ApiKey> = self
            .by_hash
            .values()
            .await?
            .into_iter()
            .filter(|k| k.organization_id == organization_id)
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys.into_iter().map(ApiKeySummary::from).collect())
    }

    /// Deactivate a key owned by `organization_id`.
    ///
    /// Returns `false` if the key does not exist or belongs to another
    /// organization; the key is left untouched in that case.
    pub async fn revoke(&self, id: &str, organization_id: &str) -> Result<bool> {
        let Some(hash) = self.by_id.get(id).await? else {
            return Ok(false);
        };

        let owner = organization_id.to_string();
        self.by_hash
            .update(&hash, &move |key: &mut ApiKey| {
                if key.organization_id != owner {
                    return false;
                }
                key.is_active = false;
                true
            })
            .await
    }
}
