//! Document access coordinator
//!
//! Ties the metadata store, blob store, metadata cache and directory
//! together. Reads are cache-aside over each owner's full metadata set;
//! writes invalidate the owner's cache entry before touching any store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::blob::{BlobStore, BlobStream, UploadStream};
use crate::cache::MetadataCache;
use crate::context::OpContext;
use crate::error::{Component, DocError, Result};
use crate::filter::{DocumentFilter, Predicate};
use crate::models::{FilesListRequest, Locator, Metadata, NewDocument};
use crate::store::{DirectoryLookup, MetadataStore};

/// Default lifetime of a cached owner set
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Front door for document reads and writes
#[derive(Clone)]
pub struct DocumentCoordinator {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    cache: Arc<dyn MetadataCache>,
    directory: Arc<dyn DirectoryLookup>,
    cache_ttl: Duration,
}

impl DocumentCoordinator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<dyn MetadataCache>,
        directory: Arc<dyn DirectoryLookup>,
    ) -> Self {
        Self {
            store,
            blobs,
            cache,
            directory,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Override how long an owner's set stays cached
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Store a new document.
    ///
    /// Metadata is committed before the payload is written. If the blob
    /// write fails the record stays behind and the error is returned; the
    /// caller decides whether to delete it.
    pub async fn upload_document(
        &self,
        ctx: &OpContext,
        doc: NewDocument,
        stream: Option<UploadStream>,
    ) -> Result<Metadata> {
        let doc = doc.validate()?;
        let payload = match (doc.is_file, stream) {
            (true, Some(stream)) => Some(stream),
            (true, None) => return Err(DocError::MissingPayload),
            (false, Some(_)) => {
                debug!(owner = %doc.owner_id, name = %doc.name, "Ignoring payload stream for inline document");
                None
            }
            (false, None) => None,
        };

        self.invalidate(ctx, doc.owner_id, "upload").await?;

        let meta = self
            .store
            .upload_metadata(ctx, &doc)
            .await
            .map_err(|e| DocError::backend(Component::MetadataStore, "upload_metadata", e))?;

        if let Some(stream) = payload {
            let locator = meta.locator();
            if let Err(e) = self.blobs.put(ctx, &locator, stream, meta.file_size).await {
                warn!(
                    locator = %locator,
                    backend = self.blobs.backend_name(),
                    error = %e,
                    "Payload write failed after metadata commit"
                );
                return Err(DocError::backend(Component::BlobStore, "put", e));
            }
        }

        info!(owner = %meta.owner_id, doc = %meta.id, name = %meta.name, file = meta.is_file, "Document uploaded");
        Ok(meta)
    }

    /// List one owner's documents matching a single filter.
    ///
    /// The owner is `request.login` resolved through the directory, or the
    /// requester when no login is given. An unknown login is `NotFound`.
    pub async fn get_files_info(
        &self,
        ctx: &OpContext,
        requesting_user: Uuid,
        request: &FilesListRequest,
    ) -> Result<Vec<Metadata>> {
        // Parse the filter before any I/O
        let mut filter = DocumentFilter::new(request.limit, request.offset);
        filter.add_filter(&request.key, &request.value)?;

        let owner = match request.login.as_deref() {
            Some(login) => self
                .directory
                .resolve_login(ctx, login)
                .await
                .map_err(|e| DocError::backend(Component::Directory, "resolve_login", e))?
                .ok_or_else(|| {
                    debug!(login = login, "Unknown login in listing request");
                    DocError::NotFound
                })?,
            None => requesting_user,
        };

        let docs = self.load_owner_set(ctx, owner).await?;
        let page = filter.filter_data(&docs);

        debug!(
            requester = %requesting_user,
            owner = %owner,
            key = %request.key,
            total = docs.len(),
            returned = page.len(),
            "Listed documents"
        );
        Ok(page)
    }

    /// Metadata of one of `user_id`'s documents.
    ///
    /// A document owned by someone else is reported exactly like a missing one.
    pub async fn get_file_info(&self, ctx: &OpContext, doc_id: Uuid, user_id: Uuid) -> Result<Metadata> {
        let docs = self.load_owner_set(ctx, user_id).await?;
        let filter = DocumentFilter::new(1, 0).with_predicate(Predicate::Id(doc_id));

        filter
            .filter_data(&docs)
            .into_iter()
            .next()
            .ok_or(DocError::NotFound)
    }

    /// Open the payload of a file document
    pub async fn get_file(&self, ctx: &OpContext, meta: &Metadata) -> Result<BlobStream> {
        let locator = meta.locator();
        trace!(locator = %locator, backend = self.blobs.backend_name(), "Opening payload");

        self.blobs
            .get(ctx, &locator)
            .await
            .map_err(|e| DocError::backend(Component::BlobStore, "get", e))
    }

    /// Delete one of `user_id`'s documents.
    ///
    /// A document that does not belong to `user_id` is left untouched and
    /// the call still succeeds.
    pub async fn delete_file(&self, ctx: &OpContext, doc_id: Uuid, user_id: Uuid) -> Result<()> {
        self.invalidate(ctx, user_id, "delete").await?;

        let locator = Locator::new(user_id, doc_id);
        self.blobs
            .delete(ctx, &locator)
            .await
            .map_err(|e| DocError::backend(Component::BlobStore, "delete", e))?;

        let affected = self
            .store
            .delete_metadata(ctx, doc_id, user_id)
            .await
            .map_err(|e| DocError::backend(Component::MetadataStore, "delete_metadata", e))?;

        if affected == 0 {
            debug!(owner = %user_id, doc = %doc_id, "Delete matched no live document");
        } else {
            info!(owner = %user_id, doc = %doc_id, "Document deleted");
        }
        Ok(())
    }

    /// Drop the cached metadata set for `user_id`
    pub async fn invalidate_user_cache(&self, ctx: &OpContext, user_id: Uuid) -> Result<()> {
        self.invalidate(ctx, user_id, "invalidate").await
    }

    async fn invalidate(&self, ctx: &OpContext, owner: Uuid, op: &'static str) -> Result<()> {
        trace!(owner = %owner, op = op, "Invalidating owner cache");
        self.cache
            .invalidate(ctx, owner)
            .await
            .map_err(|e| DocError::backend(Component::Cache, "invalidate", e))
    }

    /// Cache-aside load of an owner's full metadata set
    async fn load_owner_set(&self, ctx: &OpContext, owner: Uuid) -> Result<Vec<Metadata>> {
        let cached = self
            .cache
            .get(ctx, owner)
            .await
            .map_err(|e| DocError::backend(Component::Cache, "get", e))?;

        if let Some(docs) = cached {
            trace!(owner = %owner, count = docs.len(), "Metadata cache hit");
            return Ok(docs);
        }

        trace!(owner = %owner, "Metadata cache miss");
        let docs = self
            .store
            .get_metadata_by_owner(ctx, owner)
            .await
            .map_err(|e| DocError::backend(Component::MetadataStore, "get_metadata_by_owner", e))?;

        self.cache
            .set(ctx, owner, docs.clone(), self.cache_ttl)
            .await
            .map_err(|e| DocError::backend(Component::Cache, "set", e))?;

        Ok(docs)
    }
}
