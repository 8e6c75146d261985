//! Backblaze B2 blob store
//!
//! Object names are the locator string (`owner_id:id`). Downloads are
//! spooled to an anonymous temp file so the returned handle is seekable
//! and independent of the HTTP connection.

use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Body;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::{BlobStore, BlobStream, UploadStream};
use crate::b2::{B2Client, B2Error};
use crate::context::OpContext;
use crate::error::{BackendError, BackendResult};
use crate::models::Locator;

/// Let B2 infer the content type from the name
const AUTO_CONTENT_TYPE: &str = "b2/x-auto";

/// Bytes handed to the HTTP body so far, and whether the source ran dry early
#[derive(Default)]
struct BodyProgress {
    sent: AtomicU64,
    short: AtomicBool,
}

/// Body chunks of at most `size` bytes from `stream`.
///
/// A source that ends before `size` bytes ends the body with an
/// `UnexpectedEof` error and marks the progress as short.
fn capped_body(
    stream: UploadStream,
    size: u64,
) -> (impl Stream<Item = io::Result<bytes::Bytes>> + Send + Sync + 'static, Arc<BodyProgress>) {
    let progress = Arc::new(BodyProgress::default());
    let counter = progress.clone();
    let tail = progress.clone();

    let chunks = ReaderStream::new(stream.take(size))
        .inspect(move |chunk| {
            if let Ok(data) = chunk {
                counter.sent.fetch_add(data.len() as u64, Ordering::Relaxed);
            }
        })
        .chain(futures::stream::once(async move {
            let sent = tail.sent.load(Ordering::Relaxed);
            if sent < size {
                tail.short.store(true, Ordering::Relaxed);
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("payload ended after {} of {} bytes", sent, size),
                ))
            } else {
                Ok(bytes::Bytes::new())
            }
        }));

    (chunks, progress)
}

pub struct B2BlobStore {
    client: B2Client,
    /// Directory for download spool files
    spool_dir: PathBuf,
}

impl B2BlobStore {
    pub fn new(client: B2Client, spool_dir: impl Into<PathBuf>) -> BackendResult<Self> {
        let spool_dir = spool_dir.into();
        std::fs::create_dir_all(&spool_dir)?;

        info!(
            bucket = client.bucket_name(),
            spool = %spool_dir.display(),
            "B2 blob store initialized"
        );
        Ok(Self { client, spool_dir })
    }

    async fn upload(&self, locator: &Locator, stream: UploadStream, size: u64) -> BackendResult<()> {
        let name = locator.to_string();

        let (chunks, progress) = capped_body(stream, size);
        let uploaded = match self
            .client
            .upload(&name, Body::wrap_stream(chunks), size, AUTO_CONTENT_TYPE)
            .await
        {
            Ok(uploaded) => uploaded,
            Err(_) if progress.short.load(Ordering::Relaxed) => {
                return Err(BackendError::SizeMismatch {
                    expected: size,
                    actual: progress.sent.load(Ordering::Relaxed),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if uploaded.content_length != size {
            // Do not leave a truncated object behind
            if let Err(e) = self.client.delete_version(&name, &uploaded.file_id).await {
                warn!(locator = %locator, file_id = %uploaded.file_id, error = %e, "Failed to remove mis-sized B2 upload");
            }
            return Err(BackendError::SizeMismatch {
                expected: size,
                actual: uploaded.content_length,
            });
        }

        debug!(locator = %locator, file_id = %uploaded.file_id, "Stored blob in B2");
        Ok(())
    }

    async fn download(&self, locator: &Locator) -> BackendResult<BlobStream> {
        let name = locator.to_string();

        if self.client.find_file(&name).await?.is_none() {
            return Err(BackendError::NotFound(name));
        }

        let spool = tempfile::tempfile_in(&self.spool_dir)?;
        let mut file = tokio::fs::File::from_std(spool);

        let written = self.client.download_into(&name, &mut file).await.map_err(|e| match e {
            B2Error::NotFound(_) => BackendError::NotFound(name.clone()),
            other => other.into(),
        })?;
        file.seek(SeekFrom::Start(0)).await?;

        debug!(locator = %locator, size = written, "Spooled blob from B2");
        Ok(Box::new(file))
    }

    async fn remove(&self, locator: &Locator) -> BackendResult<()> {
        let name = locator.to_string();

        let file_id = self
            .client
            .find_file(&name)
            .await?
            .and_then(|info| info.file_id);

        if let Some(file_id) = file_id {
            self.client.delete_version(&name, &file_id).await?;
            debug!(locator = %locator, "Deleted blob from B2");
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for B2BlobStore {
    async fn put(
        &self,
        ctx: &OpContext,
        locator: &Locator,
        stream: UploadStream,
        size: u64,
    ) -> BackendResult<()> {
        ctx.run(self.upload(locator, stream, size)).await
    }

    async fn get(&self, ctx: &OpContext, locator: &Locator) -> BackendResult<BlobStream> {
        ctx.run(self.download(locator)).await
    }

    async fn delete(&self, ctx: &OpContext, locator: &Locator) -> BackendResult<()> {
        ctx.run(self.remove(locator)).await
    }

    fn backend_name(&self) -> &'static str {
        "b2"
    }
}
