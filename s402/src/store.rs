//! Replay and discovery store contracts.
//!
//! The replay store tracks settled-transaction hashes and their cached
//! settlement outcomes; records are immutable once written. The discovery
//! store is a keyed map from resource URL to catalog entry. A shared
//! persistent backend implements both; [`MemoryStore`] is the in-process
//! fallback for testing.

use std::collections::HashMap;

use s402_proto::{DiscoveryEntry, SettleResponse};
use tokio::sync::RwLock;

use crate::error::PaymentError;

/// Failure talking to the backing store.
#[derive(Debug, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl From<StoreError> for PaymentError {
    fn from(e: StoreError) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Keyed persistence for settled-transaction hashes.
///
/// Reads and writes must be linearizable per key. `put_if_absent` is the
/// conditional-write primitive that keeps settlement exactly-once across
/// workers sharing one store.
#[async_trait::async_trait]
pub trait ReplayStore: Send + Sync {
    /// Returns the cached settlement outcome for a transaction hash.
    async fn get(&self, tx_hash: &str) -> Result<Option<SettleResponse>, StoreError>;

    /// Records a settlement outcome unless the hash is already present.
    ///
    /// Returns `true` if this call created the record.
    async fn put_if_absent(
        &self,
        tx_hash: &str,
        result: &SettleResponse,
    ) -> Result<bool, StoreError>;
}

/// Keyed map from resource URL to discovery entry.
#[async_trait::async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Lists entries sorted by `lastUpdated` descending, optionally
    /// filtered by type. Returns the page and the total match count.
    async fn list(
        &self,
        type_filter: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<DiscoveryEntry>, u64), StoreError>;

    /// Inserts or overwrites the entry keyed by its resource URL.
    async fn register(&self, entry: DiscoveryEntry) -> Result<(), StoreError>;

    /// Removes the entry for a resource URL. Returns `true` if it existed.
    async fn unregister(&self, resource: &str) -> Result<bool, StoreError>;

    /// Fetches a single entry by resource URL.
    async fn get(&self, resource: &str) -> Result<Option<DiscoveryEntry>, StoreError>;
}

/// In-process store for tests and non-production setups.
///
/// Implements both [`ReplayStore`] and [`DiscoveryStore`] over maps behind
/// an async lock. State dies with the process, so production facilitators
/// must refuse to start on it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    replays: RwLock<HashMap<String, SettleResponse>>,
    resources: RwLock<HashMap<String, DiscoveryEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReplayStore for MemoryStore {
    async fn get(&self, tx_hash: &str) -> Result<Option<SettleResponse>, StoreError> {
        Ok(self.replays.read().await.get(tx_hash).cloned())
    }

    async fn put_if_absent(
        &self,
        tx_hash: &str,
        result: &SettleResponse,
    ) -> Result<bool, StoreError> {
        let mut replays = self.replays.write().await;
        if replays.contains_key(tx_hash) {
            return Ok(false);
        }
        replays.insert(tx_hash.to_owned(), result.clone());
        Ok(true)
    }
}

#[async_trait::async_trait]
impl DiscoveryStore for MemoryStore {
    async fn list(
        &self,
        type_filter: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<DiscoveryEntry>, u64), StoreError> {
        let resources = self.resources.read().await;
        let mut matches: Vec<DiscoveryEntry> = resources
            .values()
            .filter(|entry| type_filter.map_or(true, |t| entry.r#type == t))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn register(&self, entry: DiscoveryEntry) -> Result<(), StoreError> {
        self.resources
            .write()
            .await
            .insert(entry.resource.clone(), entry);
        Ok(())
    }

    async fn unregister(&self, resource: &str) -> Result<bool, StoreError> {
        Ok(self.resources.write().await.remove(resource).is_some())
    }

    async fn get(&self, resource: &str) -> Result<Option<DiscoveryEntry>, StoreError> {
        Ok(self.resources.read().await.get(resource).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use s402_proto::Network;

    fn settled(hash: &str) -> SettleResponse {
        SettleResponse::success(hash, Network::StellarTestnet, "GPAYER")
    }

    fn entry(resource: &str, kind: &str, age_secs: i64) -> DiscoveryEntry {
        DiscoveryEntry {
            resource: resource.to_owned(),
            r#type: kind.to_owned(),
            accepts: vec![],
            last_updated: Utc::now() - Duration::seconds(age_secs),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn replay_records_are_write_once() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("h1", &settled("h1")).await.unwrap());
        assert!(!store.put_if_absent("h1", &settled("other")).await.unwrap());

        let cached = ReplayStore::get(&store, "h1").await.unwrap().unwrap();
        assert_eq!(cached.transaction, "h1");
    }

    #[tokio::test]
    async fn discovery_lists_newest_first() {
        let store = MemoryStore::new();
        store.register(entry("https://a", "http", 30)).await.unwrap();
        store.register(entry("https://b", "http", 10)).await.unwrap();
        store.register(entry("https://c", "api", 20)).await.unwrap();

        let (page, total) = store.list(None, 20, 0).await.unwrap();
        assert_eq!(total, 3);
        let urls: Vec<_> = page.iter().map(|e| e.resource.as_str()).collect();
        assert_eq!(urls, ["https://b", "https://c", "https://a"]);

        let (filtered, total) = store.list(Some("api"), 20, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(filtered[0].resource, "https://c");
    }

    #[tokio::test]
    async fn register_overwrites_by_resource() {
        let store = MemoryStore::new();
        store.register(entry("https://a", "http", 60)).await.unwrap();
        store.register(entry("https://a", "api", 0)).await.unwrap();

        let current = DiscoveryStore::get(&store, "https://a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.r#type, "api");

        assert!(store.unregister("https://a").await.unwrap());
        assert!(!store.unregister("https://a").await.unwrap());
    }
}
