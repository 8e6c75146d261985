//! SQLite metadata store
//!
//! Documents are soft-deleted: a `deleted` flag hides them from reads.
//! Grants reference users by id; inserting a grant for an unknown login
//! fails the upload transaction.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

use super::{DirectoryLookup, MetadataStore};
use crate::context::OpContext;
use crate::error::{BackendError, BackendResult};
use crate::models::{Metadata, NewDocument};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY NOT NULL,
        login TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS documents (
        id BLOB PRIMARY KEY NOT NULL,
        owner_id BLOB NOT NULL,
        name TEXT NOT NULL,
        is_file INTEGER NOT NULL,
        is_public INTEGER NOT NULL,
        mime TEXT NOT NULL,
        created_at TEXT NOT NULL,
        json_data TEXT,
        file_size INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents (owner_id, deleted)",
    "CREATE TABLE IF NOT EXISTS document_grants (
        document_id BLOB NOT NULL REFERENCES documents (id),
        user_id BLOB NOT NULL REFERENCES users (id),
        PRIMARY KEY (document_id, user_id)
    )",
];

const INSERT_DOCUMENT: &str = "INSERT INTO documents
    (id, owner_id, name, is_file, is_public, mime, created_at, json_data, file_size)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

const INSERT_GRANT: &str = "INSERT INTO document_grants (document_id, user_id)
    SELECT ?, id FROM users WHERE login = ?";

const SELECT_OWNER_DOCUMENTS: &str = "SELECT
    id, owner_id, name, is_file, is_public, mime, created_at, json_data, file_size
    FROM documents
    WHERE owner_id = ? AND deleted = 0
    ORDER BY name ASC, created_at DESC";

const SELECT_OWNER_GRANTS: &str = "SELECT g.document_id, u.login
    FROM document_grants g
    JOIN users u ON u.id = g.user_id
    JOIN documents d ON d.id = g.document_id
    WHERE d.owner_id = ? AND d.deleted = 0
    ORDER BY u.login";

const SOFT_DELETE_DOCUMENT: &str =
    "UPDATE documents SET deleted = 1 WHERE id = ? AND owner_id = ? AND deleted = 0";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    is_file: bool,
    is_public: bool,
    mime: String,
    created_at: DateTime<Utc>,
    json_data: Option<String>,
    file_size: i64,
}

impl DocumentRow {
    fn into_metadata(self, grants: Vec<String>) -> BackendResult<Metadata> {
        let json = self
            .json_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Metadata {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            is_file: self.is_file,
            is_public: self.is_public,
            mime: self.mime,
            created_at: self.created_at,
            grants,
            json,
            file_size: u64::try_from(self.file_size)
                .map_err(|_| BackendError::Other(format!("negative file size for {}", self.id)))?,
        })
    }
}

/// SQLite-backed metadata store and user directory
pub struct SqliteMetadataStore {
    pool: Pool<Sqlite>,
}

impl SqliteMetadataStore {
    /// Open (creating if missing) the database at `path`
    pub async fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        info!(path = %path.display(), "Metadata store opened");
        Ok(store)
    }

    /// Private in-memory database, mainly for tests
    pub async fn in_memory() -> BackendResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // The database lives as long as its only connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> BackendResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Register a user login, returning the new user id
    pub async fn add_user(&self, login: &str) -> BackendResult<Uuid> {
        let id = Uuid::new_v4();
        let result = sqlx::query("INSERT INTO users (id, login) VALUES (?, ?)")
            .bind(id)
            .bind(login)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                info!(login = login, user = %id, "User added");
                Ok(id)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(BackendError::Other(format!("login {login:?} already exists")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_document(&self, doc: &NewDocument) -> BackendResult<Metadata> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let json_data = doc.json.as_ref().map(serde_json::to_string).transpose()?;
        let file_size = i64::try_from(doc.file_size)
            .map_err(|_| BackendError::Other(format!("file size {} too large", doc.file_size)))?;

        // Dropping the transaction without commit rolls it back
        let mut tx = self.pool.begin().await?;

        sqlx::query(INSERT_DOCUMENT)
            .bind(id)
            .bind(doc.owner_id)
            .bind(&doc.name)
            .bind(doc.is_file)
            .bind(doc.is_public)
            .bind(&doc.mime)
            .bind(created_at)
            .bind(json_data)
            .bind(file_size)
            .execute(&mut *tx)
            .await?;

        for login in &doc.grants {
            let result = sqlx::query(INSERT_GRANT)
                .bind(id)
                .bind(login)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(BackendError::UnknownGrantee(login.clone()));
            }
        }

        tx.commit().await?;

        debug!(owner = %doc.owner_id, doc = %id, grants = doc.grants.len(), "Inserted document metadata");
        Ok(doc.clone().into_metadata(id, created_at))
    }

    async fn select_by_owner(&self, owner_id: Uuid) -> BackendResult<Vec<Metadata>> {
        let rows = sqlx::query_as::<_, DocumentRow>(SELECT_OWNER_DOCUMENTS)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        let grant_rows = sqlx::query_as::<_, (Uuid, String)>(SELECT_OWNER_GRANTS)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        let mut grants: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (document_id, login) in grant_rows {
            grants.entry(document_id).or_default().push(login);
        }

        let docs = rows
            .into_iter()
            .map(|row| {
                let doc_grants = grants.remove(&row.id).unwrap_or_default();
                row.into_metadata(doc_grants)
            })
            .collect::<BackendResult<Vec<_>>>()?;

        debug!(owner = %owner_id, count = docs.len(), "Loaded owner metadata");
        Ok(docs)
    }

    async fn soft_delete(&self, id: Uuid, owner_id: Uuid) -> BackendResult<u64> {
        let result = sqlx::query(SOFT_DELETE_DOCUMENT)
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        debug!(owner = %owner_id, doc = %id, rows = result.rows_affected(), "Soft-deleted document");
        Ok(result.rows_affected())
    }

    async fn select_user(&self, login: &str) -> BackendResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE login = ?")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn upload_metadata(&self, ctx: &OpContext, doc: &NewDocument) -> BackendResult<Metadata> {
        ctx.run(self.insert_document(doc)).await
    }

    async fn get_metadata_by_owner(
        &self,
        ctx: &OpContext,
        owner_id: Uuid,
    ) -> BackendResult<Vec<Metadata>> {
        ctx.run(self.select_by_owner(owner_id)).await
    }

    async fn delete_metadata(&self, ctx: &OpContext, id: Uuid, owner_id: Uuid) -> BackendResult<u64> {
        ctx.run(self.soft_delete(id, owner_id)).await
    }
}

#[async_trait]
impl DirectoryLookup for SqliteMetadataStore {
    async fn resolve_login(&self, ctx: &OpContext, login: &str) -> BackendResult<Option<Uuid>> {
        ctx.run(self.select_user(login)).await
    }
}
