//! Binary payload storage
//!
//! Payloads are addressed by `Locator` (`owner_id:id`). Uploads are
//! streamed with a declared size; reads return a seekable stream the
//! caller owns and closes by dropping.

pub mod b2;
pub mod fs;

pub use self::b2::B2BlobStore;
pub use self::fs::FsBlobStore;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::context::OpContext;
use crate::error::BackendResult;
use crate::models::Locator;

/// Inbound payload source
pub type UploadStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Readable, seekable payload handle
pub trait BlobReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> BlobReader for T {}

/// Payload handle returned by `BlobStore::get`
pub type BlobStream = Box<dyn BlobReader>;

/// Object store for document payloads
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store exactly `size` bytes read from `stream`.
    ///
    /// A stream that ends early fails with `SizeMismatch` and leaves
    /// nothing at `locator`. Bytes past `size` are never stored; a backend
    /// either rejects them with `SizeMismatch` or drops them.
    async fn put(
        &self,
        ctx: &OpContext,
        locator: &Locator,
        stream: UploadStream,
        size: u64,
    ) -> BackendResult<()>;

    /// Open the payload at `locator`
    async fn get(&self, ctx: &OpContext, locator: &Locator) -> BackendResult<BlobStream>;

    /// Remove the payload; a missing object is not an error
    async fn delete(&self, ctx: &OpContext, locator: &Locator) -> BackendResult<()>;

    /// Backend identifier for logs
    fn backend_name(&self) -> &'static str;
}
