//! Authoritative metadata storage
//!
//! The metadata store owns document records and their grant rows. The
//! directory resolves logins to user ids; the SQLite backend provides both.

pub mod sqlite;

pub use sqlite::SqliteMetadataStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::OpContext;
use crate::error::BackendResult;
use crate::models::{Metadata, NewDocument};

/// Relational storage for document metadata and access grants
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Insert a record and its grant rows in one transaction.
    ///
    /// Returns the stored record with its assigned id and creation time.
    /// A failed grant insert rolls back the record.
    async fn upload_metadata(&self, ctx: &OpContext, doc: &NewDocument) -> BackendResult<Metadata>;

    /// All live records for `owner_id`, ordered by name ascending then
    /// creation time descending.
    async fn get_metadata_by_owner(
        &self,
        ctx: &OpContext,
        owner_id: Uuid,
    ) -> BackendResult<Vec<Metadata>>;

    /// Soft-delete the record matching both `id` and `owner_id`.
    ///
    /// Returns the number of rows affected; zero is not an error.
    async fn delete_metadata(&self, ctx: &OpContext, id: Uuid, owner_id: Uuid) -> BackendResult<u64>;
}

/// Login to user id resolution
#[async_trait]
pub trait DirectoryLookup: Send + Sync + 'static {
    /// `None` if no user has this login
    async fn resolve_login(&self, ctx: &OpContext, login: &str) -> BackendResult<Option<Uuid>>;
}
