//! Common test utilities and fakes.
//!
//! Every fake appends to a shared call log so tests can assert the order
//! in which the coordinator touches its collaborators.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use docvault::blob::{BlobStore, BlobStream, UploadStream};
use docvault::cache::{MetadataCache, MokaMetadataCache};
use docvault::error::{BackendError, BackendResult};
use docvault::store::{DirectoryLookup, MetadataStore};
use docvault::{DocumentCoordinator, Metadata, NewDocument, OpContext};

/// Ordered record of collaborator calls.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl CallLog {
    pub fn push(&self, call: &str) {
        self.0.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

/// In-memory metadata store and directory.
#[allow(dead_code)]
pub struct FakeStore {
    log: CallLog,
    docs: Mutex<Vec<(Metadata, bool)>>,
    logins: Mutex<HashMap<String, Uuid>>,
    /// Creation times handed out in order, one second apart
    clock: AtomicUsize,
    pub fail_upload: AtomicBool,
    pub fail_list: AtomicBool,
}

#[allow(dead_code)]
impl FakeStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            docs: Mutex::new(Vec::new()),
            logins: Mutex::new(HashMap::new()),
            clock: AtomicUsize::new(0),
            fail_upload: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
        }
    }

    pub fn add_user(&self, login: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.logins.lock().unwrap().insert(login.to_string(), id);
        id
    }

    /// Live and deleted records, bypassing the call log
    pub fn all(&self) -> Vec<(Metadata, bool)> {
        self.docs.lock().unwrap().clone()
    }

    pub fn is_deleted(&self, id: Uuid) -> Option<bool> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m.id == id)
            .map(|(_, deleted)| *deleted)
    }
}

#[async_trait]
impl MetadataStore for FakeStore {
    async fn upload_metadata(&self, ctx: &OpContext, doc: &NewDocument) -> BackendResult<Metadata> {
        ctx.check()?;
        self.log.push("store.upload_metadata");
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(BackendError::Other("injected upload failure".into()));
        }

        let logins = self.logins.lock().unwrap();
        if let Some(unknown) = doc.grants.iter().find(|g| !logins.contains_key(*g)) {
            return Err(BackendError::UnknownGrantee(unknown.clone()));
        }
        drop(logins);

        let tick = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(tick);
        let meta = doc.clone().into_metadata(Uuid::new_v4(), created);
        self.docs.lock().unwrap().push((meta.clone(), false));
        Ok(meta)
    }

    async fn get_metadata_by_owner(&self, ctx: &OpContext, owner_id: Uuid) -> BackendResult<Vec<Metadata>> {
        ctx.check()?;
        self.log.push("store.get_metadata_by_owner");
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::Other("injected list failure".into()));
        }

        let mut docs: Vec<Metadata> = self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, deleted)| !deleted && m.owner_id == owner_id)
            .map(|(m, _)| m.clone())
            .collect();
        docs.sort_by(|a, b| a.name.cmp(&b.name).then(b.created_at.cmp(&a.created_at)));
        Ok(docs)
    }

    async fn delete_metadata(&self, ctx: &OpContext, id: Uuid, owner_id: Uuid) -> BackendResult<u64> {
        ctx.check()?;
        self.log.push("store.delete_metadata");

        let mut docs = self.docs.lock().unwrap();
        let mut affected = 0;
        for (meta, deleted) in docs.iter_mut() {
            if meta.id == id && meta.owner_id == owner_id && !*deleted {
                *deleted = true;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[async_trait]
impl DirectoryLookup for FakeStore {
    async fn resolve_login(&self, ctx: &OpContext, login: &str) -> BackendResult<Option<Uuid>> {
        ctx.check()?;
        self.log.push("directory.resolve_login");
        Ok(self.logins.lock().unwrap().get(login).copied())
    }
}

/// In-memory blob store keyed by locator string.
#[allow(dead_code)]
pub struct FakeBlobs {
    log: CallLog,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
    /// `put` never completes on its own
    pub hang_put: AtomicBool,
}

#[allow(dead_code)]
impl FakeBlobs {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            objects: Mutex::new(HashMap::new()),
            fail_put: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            hang_put: AtomicBool::new(false),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    async fn store_object(
        &self,
        locator: &docvault::Locator,
        stream: UploadStream,
        size: u64,
    ) -> BackendResult<()> {
        if self.hang_put.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(BackendError::Other("injected put failure".into()));
        }

        let mut data = Vec::new();
        stream.take(size + 1).read_to_end(&mut data).await?;
        if data.len() as u64 != size {
            return Err(BackendError::SizeMismatch {
                expected: size,
                actual: data.len() as u64,
            });
        }
        self.objects.lock().unwrap().insert(locator.to_string(), data);
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn put(
        &self,
        ctx: &OpContext,
        locator: &docvault::Locator,
        stream: UploadStream,
        size: u64,
    ) -> BackendResult<()> {
        self.log.push("blob.put");
        ctx.run(self.store_object(locator, stream, size)).await
    }

    async fn get(&self, ctx: &OpContext, locator: &docvault::Locator) -> BackendResult<BlobStream> {
        ctx.check()?;
        self.log.push("blob.get");
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(&locator.to_string())
            .cloned()
            .ok_or_else(|| BackendError::NotFound(locator.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn delete(&self, ctx: &OpContext, locator: &docvault::Locator) -> BackendResult<()> {
        ctx.check()?;
        self.log.push("blob.delete");
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BackendError::Other("injected delete failure".into()));
        }
        self.objects.lock().unwrap().remove(&locator.to_string());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

/// Moka cache wrapper that logs calls and can fail on demand.
#[allow(dead_code)]
pub struct RecordingCache {
    log: CallLog,
    inner: MokaMetadataCache,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_invalidate: AtomicBool,
}

#[allow(dead_code)]
impl RecordingCache {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            inner: MokaMetadataCache::new(),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            fail_invalidate: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &MokaMetadataCache {
        &self.inner
    }
}

#[async_trait]
impl MetadataCache for RecordingCache {
    async fn get(&self, ctx: &OpContext, owner_id: Uuid) -> BackendResult<Option<Vec<Metadata>>> {
        self.log.push("cache.get");
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(BackendError::Other("injected cache get failure".into()));
        }
        self.inner.get(ctx, owner_id).await
    }

    async fn set(&self, ctx: &OpContext, owner_id: Uuid, docs: Vec<Metadata>, ttl: Duration) -> BackendResult<()> {
        self.log.push("cache.set");
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(BackendError::Other("injected cache set failure".into()));
        }
        self.inner.set(ctx, owner_id, docs, ttl).await
    }

    async fn invalidate(&self, ctx: &OpContext, owner_id: Uuid) -> BackendResult<()> {
        self.log.push("cache.invalidate");
        if self.fail_invalidate.load(Ordering::SeqCst) {
            return Err(BackendError::Other("injected cache invalidate failure".into()));
        }
        self.inner.invalidate(ctx, owner_id).await
    }
}

/// Coordinator wired to fakes that share one call log.
#[allow(dead_code)]
pub struct Harness {
    pub log: CallLog,
    pub store: Arc<FakeStore>,
    pub blobs: Arc<FakeBlobs>,
    pub cache: Arc<RecordingCache>,
    pub coordinator: DocumentCoordinator,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        let log = CallLog::default();
        let store = Arc::new(FakeStore::new(log.clone()));
        let blobs = Arc::new(FakeBlobs::new(log.clone()));
        let cache = Arc::new(RecordingCache::new(log.clone()));
        let coordinator = DocumentCoordinator::new(store.clone(), blobs.clone(), cache.clone(), store.clone());

        Self {
            log,
            store,
            blobs,
            cache,
            coordinator,
        }
    }
}

#[allow(dead_code)]
pub fn payload(data: &[u8]) -> Option<UploadStream> {
    let stream: UploadStream = Box::new(Cursor::new(data.to_vec()));
    Some(stream)
}

/// Upload a small file document, panicking on failure
#[allow(dead_code)]
pub async fn upload_file(h: &Harness, owner: Uuid, name: &str, data: &[u8]) -> Metadata {
    let doc = NewDocument::file(owner, name, "text/plain", data.len() as u64);
    h.coordinator
        .upload_document(&OpContext::background(), doc, payload(data))
        .await
        .expect("upload failed")
}
