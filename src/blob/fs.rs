//! Local filesystem blob store
//!
//! Each payload is one file under the root directory. Writes go to a temp
//! file in the same directory and are persisted by rename, so a reader
//! never sees a partial payload.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::{BlobStore, BlobStream, UploadStream};
use crate::context::OpContext;
use crate::error::{BackendError, BackendResult};
use crate::models::Locator;

/// Suffix of in-flight upload files
const TEMP_SUFFIX: &str = ".tmp";

/// Blob store rooted at a local directory
pub struct FsBlobStore {
    /// Directory holding one file per payload
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a blob store rooted at `root`, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let store = Self { root };

        // Clean up any uploads interrupted by a previous run
        store.cleanup();

        info!(root = %store.root.display(), "Filesystem blob store initialized");
        Ok(store)
    }

    /// Remove stale temp files left by interrupted uploads
    pub fn cleanup(&self) {
        if let Ok(read_dir) = fs::read_dir(&self.root) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                let is_temp = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(TEMP_SUFFIX));
                if is_temp {
                    debug!(path = %path.display(), "Removing stale temp file");
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }

    /// Convert a locator to its on-disk path
    fn path_for(&self, locator: &Locator) -> PathBuf {
        // ':' is not portable in file names
        let safe_name = locator.to_string().replace(':', "_");
        self.root.join(safe_name)
    }

    async fn write(&self, locator: &Locator, stream: UploadStream, size: u64) -> BackendResult<()> {
        let path = self.path_for(locator);

        let tmp = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.root)?;
        let mut file = tokio::fs::File::from_std(tmp.reopen()?);

        // One byte past the declared size is enough to detect an oversized stream
        let mut limited = stream.take(size.saturating_add(1));
        let written = tokio::io::copy(&mut limited, &mut file).await?;
        if written != size {
            return Err(BackendError::SizeMismatch {
                expected: size,
                actual: written,
            });
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tmp.persist(&path).map_err(|e| BackendError::Io(e.error))?;

        debug!(locator = %locator, path = %path.display(), size = size, "Stored blob");
        Ok(())
    }

    async fn open(&self, locator: &Locator) -> BackendResult<BlobStream> {
        let path = self.path_for(locator);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BackendError::NotFound(locator.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, locator: &Locator) -> BackendResult<()> {
        let path = self.path_for(locator);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(locator = %locator, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        ctx: &OpContext,
        locator: &Locator,
        stream: UploadStream,
        size: u64,
    ) -> BackendResult<()> {
        ctx.run(self.write(locator, stream, size)).await
    }

    async fn get(&self, ctx: &OpContext, locator: &Locator) -> BackendResult<BlobStream> {
        ctx.run(self.open(locator)).await
    }

    async fn delete(&self, ctx: &OpContext, locator: &Locator) -> BackendResult<()> {
        ctx.run(self.remove(locator)).await
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
