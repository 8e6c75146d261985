//! Per-owner metadata caching layer
//!
//! The cache holds each owner's complete metadata list as last read from
//! the metadata store. Entries are replaced wholesale and expire by TTL or
//! explicit invalidation.

pub mod metadata;

pub use metadata::{CacheStats, MokaMetadataCache};

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::OpContext;
use crate::error::BackendResult;
use crate::models::Metadata;

/// Cache of each owner's full metadata set
#[async_trait]
pub trait MetadataCache: Send + Sync + 'static {
    /// `None` on miss
    async fn get(&self, ctx: &OpContext, owner_id: Uuid) -> BackendResult<Option<Vec<Metadata>>>;

    /// Replace the owner's entry
    async fn set(
        &self,
        ctx: &OpContext,
        owner_id: Uuid,
        docs: Vec<Metadata>,
        ttl: Duration,
    ) -> BackendResult<()>;

    /// Drop the owner's entry; absent entries are not an error
    async fn invalidate(&self, ctx: &OpContext, owner_id: Uuid) -> BackendResult<()>;
}
