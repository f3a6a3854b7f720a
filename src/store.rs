//! Key-value store abstraction shared by every credential store.
//!
//! The [`KvStore`] trait is the contract surface; [`InMemoryStore`] is the
//! only implementation shipped, backed by a `DashMap`. A deployment running
//! several gateway instances needs an implementation over a shared backend
//! (Redis, Postgres), otherwise a code issued by one instance cannot be
//! redeemed on another.
//!
//! # Atomicity
//!
//! - [`KvStore::take`] removes and returns in one step. Single-use credentials
//!   (authorization codes, refresh tokens) are redeemed with it so two
//!   concurrent redemptions cannot both succeed.
//! - [`KvStore::update`] mutates in place under the entry lock, so a
//!   revocation and a concurrent `last_used` touch never overwrite each other.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::Result;

/// Storage backend for one kind of record, keyed by string.
///
/// Implementations must be `Send + Sync` because stores are shared across
/// request handlers.
#[async_trait]
pub trait KvStore<V>: Send + Sync + 'static
where
    V: Clone + Send + Sync + 'static,
{
    /// Look up a record.
    async fn get(&self, key: &str) -> Result<Option<V>>;

    /// Insert or replace a record.
    async fn put(&self, key: &str, value: V) -> Result<()>;

    /// Remove a record. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically remove and return a record.
    async fn take(&self, key: &str) -> Result<Option<V>>;

    /// Atomically mutate a record in place.
    ///
    /// `apply` returns whether it changed anything; the result is `true` only
    /// if the record exists and `apply` returned `true`.
    async fn update(&self, key: &str, apply: &(dyn for<'a> Fn(&'a mut V) -> bool + Send + Sync))
    -> Result<bool>;

    /// Snapshot of all records.
    async fn values(&self) -> Result<Vec<V>>;

    /// Drop every record for which `keep` returns `false`. Returns the number removed.
    async fn retain(&self, keep: &(dyn for<'a> Fn(&'a V) -> bool + Send + Sync)) -> Result<usize>;
}

/// In-process store backed by a `DashMap`.
pub struct InMemoryStore<V> {
    entries: DashMap<String, V>,
}

impl<V> InMemoryStore<V> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of records currently held, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> KvStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: V) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<V>> {
        Ok(self.entries.remove(key).map(|(_, value)| value))
    }

    async fn update(
        &self,
        key: &str,
        apply: &(dyn for<'a> Fn(&'a mut V) -> bool + Send + Sync),
    ) -> Result<bool> {
        Ok(self
            .entries
            .get_mut(key)
            .is_some_and(|mut entry| apply(entry.value_mut())))
    }

    async fn values(&self) -> Result<Vec<V>> {
        Ok(self.entries.iter().map(|e| e.value().clone()).collect())
    }

    async fn retain(&self, keep: &(dyn for<'a> Fn(&'a V) -> bool + Send + Sync)) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, value| keep(value));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

/// A store whose records expire and can be swept in bulk.
#[async_trait]
pub trait ExpiringStore: Send + Sync + 'static {
    /// Label for logs.
    fn name(&self) -> &'static str;

    /// Remove all expired records. Returns the number removed.
    async fn purge_expired(&self) -> Result<usize>;
}

/// Spawn a background task that sweeps expired records every `interval`.
///
/// Expiry is still enforced on every read; the sweep only bounds memory.
/// The task exits when the `shutdown` receiver fires.
pub fn spawn_reaper(
    stores: Vec<Arc<dyn ExpiringStore>>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for store in &stores {
                        match store.purge_expired().await {
                            Ok(0) => {}
                            Ok(count) => debug!(store = store.name(), count, "Reaped expired credentials"),
                            Err(e) => warn!(store = store.name(), error = %e, "Reaper sweep failed"),
                        }
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Credential reaper shutting down");
                    break;
                }
            }
        }
    });
}
