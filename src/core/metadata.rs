use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use ultratube_core::backend::MediaBackend;
use ultratube_core::models::job::NetworkOptions;

pub const DEFAULT_CAPACITY: usize = 64;
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
}

/// URL-keyed metadata with a size bound and a TTL. The oldest entry is
/// evicted first once the bound is reached.
pub struct MetadataCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&mut self, url: &str) -> Option<serde_json::Value> {
        self.get_at(url, Instant::now())
    }

    fn get_at(&mut self, url: &str, now: Instant) -> Option<serde_json::Value> {
        self.evict_expired(now);
        self.entries.get(url).map(|e| e.value.clone())
    }

    pub fn insert(&mut self, url: &str, value: serde_json::Value) {
        self.insert_at(url, value, Instant::now());
    }

    fn insert_at(&mut self, url: &str, value: serde_json::Value, now: Instant) {
        self.evict_expired(now);
        if !self.entries.contains_key(url) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) <= ttl);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!("Metadata cache: evicted {} expired entries", evicted);
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.inserted_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

/// Metadata lookups through the backend, memoized in an owned cache.
pub struct MetadataFetcher {
    backend: Arc<dyn MediaBackend>,
    cache: Mutex<MetadataCache>,
}

impl MetadataFetcher {
    pub fn new(backend: Arc<dyn MediaBackend>, cache: MetadataCache) -> Self {
        Self {
            backend,
            cache: Mutex::new(cache),
        }
    }

    pub async fn fetch(
        &self,
        url: &str,
        network: &NetworkOptions,
    ) -> anyhow::Result<serde_json::Value> {
        if let Some(cached) = self.cache.lock().await.get(url) {
            tracing::info!("Using cached metadata for: {}", url);
            return Ok(cached);
        }
        self.fetch_fresh(url, network).await
    }

    /// Always asks the backend; the result still refreshes the cache.
    pub async fn fetch_fresh(
        &self,
        url: &str,
        network: &NetworkOptions,
    ) -> anyhow::Result<serde_json::Value> {
        match self.backend.fetch_metadata(url, network).await {
            Ok(value) => {
                self.cache.lock().await.insert(url, value.clone());
                Ok(value)
            }
            Err(e) => {
                tracing::error!("Error fetching info for {}: {}", url, e);
                Err(e)
            }
        }
    }
}
