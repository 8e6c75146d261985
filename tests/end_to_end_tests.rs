//! Coordinator over the real SQLite store, filesystem blobs and Moka cache.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use docvault::blob::{FsBlobStore, UploadStream};
use docvault::cache::MokaMetadataCache;
use docvault::store::SqliteMetadataStore;
use docvault::{DocumentCoordinator, FilesListRequest, NewDocument, OpContext};

struct Stack {
    coordinator: DocumentCoordinator,
    store: Arc<SqliteMetadataStore>,
    _dir: TempDir,
}

async fn stack() -> Stack {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let store = Arc::new(
        SqliteMetadataStore::open(dir.path().join("metadata.db"))
            .await
            .unwrap(),
    );
    let blobs = Arc::new(FsBlobStore::new(dir.path().join("blobs")).unwrap());
    let cache = Arc::new(MokaMetadataCache::new());
    let coordinator = DocumentCoordinator::new(store.clone(), blobs, cache, store.clone())
        .with_cache_ttl(Duration::from_secs(60));

    Stack {
        coordinator,
        store,
        _dir: dir,
    }
}

fn stream(data: &[u8]) -> Option<UploadStream> {
    let stream: UploadStream = Box::new(Cursor::new(data.to_vec()));
    Some(stream)
}

#[tokio::test]
async fn test_document_lifecycle() {
    let s = stack().await;
    let ctx = OpContext::background();
    let alice = s.store.add_user("alice").await.unwrap();
    s.store.add_user("bob").await.unwrap();
    s.store.add_user("zed").await.unwrap();

    let doc = NewDocument::file(alice, "notes.txt", "text/plain", 5)
        .public(true)
        .grant("zed")
        .grant("bob");
    let meta = s.coordinator.upload_document(&ctx, doc, stream(b"hello")).await.unwrap();
    assert_eq!(meta.grants, vec!["bob".to_string(), "zed".to_string()]);

    let info = s.coordinator.get_file_info(&ctx, meta.id, alice).await.unwrap();
    assert_eq!(info, meta);

    let mut payload = s.coordinator.get_file(&ctx, &info).await.unwrap();
    let mut body = Vec::new();
    payload.read_to_end(&mut body).await.unwrap();
    assert_eq!(body, b"hello");
    drop(payload);

    let request = FilesListRequest {
        login: Some("alice".to_string()),
        key: "grant".to_string(),
        value: "bob".to_string(),
        limit: 10,
        offset: 0,
    };
    let shared = s.coordinator.get_files_info(&ctx, alice, &request).await.unwrap();
    assert_eq!(shared.len(), 1);

    s.coordinator.delete_file(&ctx, meta.id, alice).await.unwrap();
    let err = s.coordinator.get_file_info(&ctx, meta.id, alice).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_listing_sees_writes_immediately() {
    let s = stack().await;
    let ctx = OpContext::background();
    let alice = s.store.add_user("alice").await.unwrap();

    let request = FilesListRequest {
        login: None,
        key: "file".to_string(),
        value: "false".to_string(),
        limit: 10,
        offset: 0,
    };
    assert!(s.coordinator.get_files_info(&ctx, alice, &request).await.unwrap().is_empty());

    let doc = NewDocument::json(alice, "profile", serde_json::json!({"lang": "en"}));
    s.coordinator.upload_document(&ctx, doc, None).await.unwrap();

    let docs = s.coordinator.get_files_info(&ctx, alice, &request).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].json, Some(serde_json::json!({"lang": "en"})));
}

#[tokio::test]
async fn test_unknown_grantee_rolls_back_record() {
    let s = stack().await;
    let ctx = OpContext::background();
    let alice = s.store.add_user("alice").await.unwrap();

    let doc = NewDocument::file(alice, "x.bin", "application/octet-stream", 1).grant("nobody");
    assert!(s.coordinator.upload_document(&ctx, doc, stream(b"x")).await.is_err());

    let request = FilesListRequest {
        login: None,
        key: "name".to_string(),
        value: "x.bin".to_string(),
        limit: 10,
        offset: 0,
    };
    assert!(s.coordinator.get_files_info(&ctx, alice, &request).await.unwrap().is_empty());
}
