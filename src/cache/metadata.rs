//! Metadata Cache Implementation
//!
//! In-process cache of per-owner metadata lists using Moka.
//! Each entry carries its own TTL, supplied by the caller on `set`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use tracing::{debug, trace};
use uuid::Uuid;

use super::MetadataCache;
use crate::context::OpContext;
use crate::error::BackendResult;
use crate::models::Metadata;

/// Default number of owners kept in memory
const DEFAULT_MAX_OWNERS: u64 = 10_000;

/// Cache entry for one owner's metadata list
#[derive(Clone, Debug)]
pub struct CachedList {
    /// The owner's documents, in store order
    pub docs: Arc<Vec<Metadata>>,
    /// Lifetime requested by the writer
    pub ttl: Duration,
    /// When this entry was cached
    pub cached_at: Instant,
}

/// Expires each entry after the TTL it was inserted with
struct PerEntryTtl;

impl Expiry<Uuid, CachedList> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _owner: &Uuid,
        value: &CachedList,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _owner: &Uuid,
        value: &CachedList,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Percentage, 0.0 when nothing was read yet
    pub hit_rate: f64,
}

/// Metadata cache with per-entry TTL
pub struct MokaMetadataCache {
    /// Owner id -> full metadata list
    lists: Cache<Uuid, CachedList>,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl MokaMetadataCache {
    /// Create a cache with the default owner capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_OWNERS)
    }

    /// Create a cache holding at most `max_owners` entries
    pub fn with_capacity(max_owners: u64) -> Self {
        let lists = Cache::builder()
            .name("owner_metadata_cache")
            .max_capacity(max_owners)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            lists,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
        }
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let stats = self.stats();
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = format!("{:.1}%", stats.hit_rate),
            owners = self.lists.entry_count(),
            "Cache metrics"
        );
    }

    async fn lookup(&self, owner_id: Uuid) -> BackendResult<Option<Vec<Metadata>>> {
        match self.lists.get(&owner_id).await {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(
                    owner = %owner_id,
                    docs = cached.docs.len(),
                    age_ms = cached.cached_at.elapsed().as_millis() as u64,
                    "Cache HIT for owner metadata"
                );
                Ok(Some(cached.docs.as_ref().clone()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(owner = %owner_id, "Cache MISS for owner metadata");
                Ok(None)
            }
        }
    }

    async fn store(&self, owner_id: Uuid, docs: Vec<Metadata>, ttl: Duration) -> BackendResult<()> {
        let count = docs.len();
        let cached = CachedList {
            docs: Arc::new(docs),
            ttl,
            cached_at: Instant::now(),
        };
        self.lists.insert(owner_id, cached).await;
        debug!(owner = %owner_id, docs = count, ttl_secs = ttl.as_secs(), "Cached owner metadata");
        Ok(())
    }

    async fn remove(&self, owner_id: Uuid) -> BackendResult<()> {
        self.lists.invalidate(&owner_id).await;
        debug!(owner = %owner_id, "Invalidated owner metadata");
        Ok(())
    }
}

impl Default for MokaMetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataCache for MokaMetadataCache {
    async fn get(&self, ctx: &OpContext, owner_id: Uuid) -> BackendResult<Option<Vec<Metadata>>> {
        ctx.run(self.lookup(owner_id)).await
    }

    async fn set(
        &self,
        ctx: &OpContext,
        owner_id: Uuid,
        docs: Vec<Metadata>,
        ttl: Duration,
    ) -> BackendResult<()> {
        ctx.run(self.store(owner_id, docs, ttl)).await
    }

    async fn invalidate(&self, ctx: &OpContext, owner_id: Uuid) -> BackendResult<()> {
        ctx.run(self.remove(owner_id)).await
    }
}
