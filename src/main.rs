//! DocVault CLI - store, list and fetch owner-scoped documents
//!
//! Metadata lives in SQLite under the data directory. Payloads go to
//! Backblaze B2 when credentials are configured, otherwise to local files.

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use docvault::b2::B2Client;
use docvault::blob::{B2BlobStore, BlobStore, FsBlobStore, UploadStream};
use docvault::cache::MokaMetadataCache;
use docvault::config::Config;
use docvault::store::{DirectoryLookup, SqliteMetadataStore};
use docvault::{DocumentCoordinator, FilesListRequest, NewDocument, OpContext};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Register a login in the user directory
    AddUser { login: String },
    /// Upload a local file
    Upload {
        owner: String,
        path: PathBuf,
        public: bool,
        mime: Option<String>,
        grants: Vec<String>,
    },
    /// Store an inline JSON document
    UploadJson {
        owner: String,
        name: String,
        json: String,
        public: bool,
        grants: Vec<String>,
    },
    /// List documents matching one filter
    List {
        user: String,
        key: String,
        value: String,
        login: Option<String>,
        limit: usize,
        offset: usize,
    },
    /// Show one document's metadata
    Info { user: String, doc: Uuid },
    /// Write a document's payload to a local path
    Get { user: String, doc: Uuid, out: PathBuf },
    /// Delete a document
    Delete { user: String, doc: Uuid },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"DocVault - owner-scoped document storage

USAGE:
    docvault adduser <login>
    docvault upload <owner> <path> [--public] [--mime <type>] [--grant <login>]...
    docvault upload-json <owner> <name> <json> [--public] [--grant <login>]...
    docvault list <user> <key> <value> [--login <login>] [--limit <n>] [--offset <n>]
    docvault info <user> <doc-id>
    docvault get <user> <doc-id> <out-path>
    docvault delete <user> <doc-id>
    docvault help

    <owner> and <user> accept a user id or a login.

FILTER KEYS:
    name     *suffix, prefix* or substring
    created  >date, <date, =date or from~to  (date: YYYY-MM-DD HH:MM:SS, UTC)
    owner, file, mime, public, grant, id

ENVIRONMENT:
    DOCVAULT_DATA_DIR           Data directory (default: platform data dir)
    DOCVAULT_CACHE_TTL_SECS     Metadata cache lifetime (default: 86400)
    DOCVAULT_CACHE_CAPACITY     Owners kept in the cache (default: 10000)
    DOCVAULT_MAX_UPLOAD_BYTES   Largest accepted upload (default: 64 MiB)
    DOCVAULT_TIMEOUT_SECS       Per-command deadline (default: none)
    B2_KEY_ID, B2_KEY, B2_BUCKET
                                Store payloads in Backblaze B2
    RUST_LOG                    Log level (trace, debug, info, warn, error)
"#
    );
}

/// Positional arguments and `--flag [value]` options after the command name
struct Args {
    positional: Vec<String>,
    flags: Vec<(String, Option<String>)>,
}

impl Args {
    fn split(raw: &[String]) -> Result<Self> {
        let mut positional = Vec::new();
        let mut flags = Vec::new();
        let mut iter = raw.iter();

        while let Some(arg) = iter.next() {
            match arg.strip_prefix("--") {
                Some("public") => flags.push(("public".to_string(), None)),
                Some(name @ ("mime" | "grant" | "login" | "limit" | "offset")) => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow!("--{} requires a value", name))?;
                    flags.push((name.to_string(), Some(value.clone())));
                }
                Some(other) => bail!("Unknown option: --{}", other),
                None => positional.push(arg.clone()),
            }
        }

        Ok(Self { positional, flags })
    }

    fn require(&self, count: usize, usage: &str) -> Result<()> {
        if self.positional.len() != count {
            bail!("Usage: docvault {}", usage);
        }
        Ok(())
    }

    fn has(&self, name: &str) -> bool {
        self.flags.iter().any(|(n, _)| n == name)
    }

    fn value(&self, name: &str) -> Option<String> {
        self.flags
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.clone())
    }

    fn values(&self, name: &str) -> Vec<String> {
        self.flags
            .iter()
            .filter(|(n, _)| n == name)
            .filter_map(|(_, v)| v.clone())
            .collect()
    }

    fn number(&self, name: &str, default: usize) -> Result<usize> {
        match self.value(name) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("--{} must be a non-negative integer", name)),
            None => Ok(default),
        }
    }
}

fn parse_doc_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid document id: {}", raw))
}

fn parse_args() -> Result<Command> {
    let raw: Vec<String> = env::args().collect();

    if raw.len() < 2 {
        return Ok(Command::Help);
    }

    let args = Args::split(&raw[2..])?;
    let p = &args.positional;

    match raw[1].as_str() {
        "adduser" => {
            args.require(1, "adduser <login>")?;
            Ok(Command::AddUser { login: p[0].clone() })
        }
        "upload" => {
            args.require(2, "upload <owner> <path> [--public] [--mime <type>] [--grant <login>]...")?;
            Ok(Command::Upload {
                owner: p[0].clone(),
                path: PathBuf::from(&p[1]),
                public: args.has("public"),
                mime: args.value("mime"),
                grants: args.values("grant"),
            })
        }
        "upload-json" => {
            args.require(3, "upload-json <owner> <name> <json> [--public] [--grant <login>]...")?;
            Ok(Command::UploadJson {
                owner: p[0].clone(),
                name: p[1].clone(),
                json: p[2].clone(),
                public: args.has("public"),
                grants: args.values("grant"),
            })
        }
        "list" => {
            args.require(3, "list <user> <key> <value> [--login <login>] [--limit <n>] [--offset <n>]")?;
            Ok(Command::List {
                user: p[0].clone(),
                key: p[1].clone(),
                value: p[2].clone(),
                login: args.value("login"),
                limit: args.number("limit", 100)?,
                offset: args.number("offset", 0)?,
            })
        }
        "info" => {
            args.require(2, "info <user> <doc-id>")?;
            Ok(Command::Info {
                user: p[0].clone(),
                doc: parse_doc_id(&p[1])?,
            })
        }
        "get" => {
            args.require(3, "get <user> <doc-id> <out-path>")?;
            Ok(Command::Get {
                user: p[0].clone(),
                doc: parse_doc_id(&p[1])?,
                out: PathBuf::from(&p[2]),
            })
        }
        "delete" => {
            args.require(2, "delete <user> <doc-id>")?;
            Ok(Command::Delete {
                user: p[0].clone(),
                doc: parse_doc_id(&p[1])?,
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => {
            eprintln!("Unknown command: {}", other);
            Ok(Command::Help)
        }
    }
}

/// Everything a command needs
struct App {
    coordinator: DocumentCoordinator,
    store: Arc<SqliteMetadataStore>,
    cache: Arc<MokaMetadataCache>,
    config: Config,
}

impl App {
    async fn open(config: Config) -> Result<Self> {
        let store = Arc::new(
            SqliteMetadataStore::open(config.database_path())
                .await
                .context("Failed to open metadata database")?,
        );

        let blobs: Arc<dyn BlobStore> = match &config.b2 {
            Some(b2) => {
                let client = B2Client::authorize(&b2.key_id, &b2.key, &b2.bucket)
                    .await
                    .context("Failed to authorize with B2")?;
                Arc::new(B2BlobStore::new(client, config.spool_dir())?)
            }
            None => Arc::new(FsBlobStore::new(config.blob_dir())?),
        };

        let cache = Arc::new(MokaMetadataCache::with_capacity(config.cache_capacity));

        let coordinator = DocumentCoordinator::new(store.clone(), blobs, cache.clone(), store.clone())
            .with_cache_ttl(config.cache_ttl);

        Ok(Self {
            coordinator,
            store,
            cache,
            config,
        })
    }

    /// Accept either a user id or a login
    async fn resolve_user(&self, ctx: &OpContext, user: &str) -> Result<Uuid> {
        if let Ok(id) = Uuid::parse_str(user) {
            return Ok(id);
        }
        self.store
            .resolve_login(ctx, user)
            .await?
            .ok_or_else(|| anyhow!("Unknown user: {}", user))
    }

    async fn run(&self, ctx: &OpContext, command: Command) -> Result<()> {
        match command {
            Command::AddUser { login } => {
                let id = self.store.add_user(&login).await?;
                println!("{}", id);
            }
            Command::Upload {
                owner,
                path,
                public,
                mime,
                grants,
            } => {
                let owner = self.resolve_user(ctx, &owner).await?;
                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                let size = file.metadata().await?.len();
                if size > self.config.max_upload_bytes {
                    bail!(
                        "{} is {} bytes, larger than the {} byte upload limit",
                        path.display(),
                        size,
                        self.config.max_upload_bytes
                    );
                }

                let name = file_name(&path)?;
                let mime = mime.unwrap_or_else(|| "application/octet-stream".to_string());
                let doc = grants
                    .into_iter()
                    .fold(NewDocument::file(owner, name, mime, size).public(public), |doc, login| {
                        doc.grant(login)
                    });

                let stream: UploadStream = Box::new(file);
                let meta = self.coordinator.upload_document(ctx, doc, Some(stream)).await?;
                println!("{}", serde_json::to_string_pretty(&meta)?);
            }
            Command::UploadJson {
                owner,
                name,
                json,
                public,
                grants,
            } => {
                let owner = self.resolve_user(ctx, &owner).await?;
                let value: serde_json::Value =
                    serde_json::from_str(&json).context("Document body is not valid JSON")?;
                let doc = grants
                    .into_iter()
                    .fold(NewDocument::json(owner, name, value).public(public), |doc, login| {
                        doc.grant(login)
                    });

                let meta = self.coordinator.upload_document(ctx, doc, None).await?;
                println!("{}", serde_json::to_string_pretty(&meta)?);
            }
            Command::List {
                user,
                key,
                value,
                login,
                limit,
                offset,
            } => {
                let user = self.resolve_user(ctx, &user).await?;
                let request = FilesListRequest {
                    login,
                    key,
                    value,
                    limit,
                    offset,
                };
                let docs = self.coordinator.get_files_info(ctx, user, &request).await?;
                println!("{}", serde_json::to_string_pretty(&docs)?);
            }
            Command::Info { user, doc } => {
                let user = self.resolve_user(ctx, &user).await?;
                let meta = self.coordinator.get_file_info(ctx, doc, user).await?;
                println!("{}", serde_json::to_string_pretty(&meta)?);
            }
            Command::Get { user, doc, out } => {
                let user = self.resolve_user(ctx, &user).await?;
                let meta = self.coordinator.get_file_info(ctx, doc, user).await?;

                let mut dest = tokio::fs::File::create(&out)
                    .await
                    .with_context(|| format!("Failed to create {}", out.display()))?;

                let written = if meta.is_file {
                    let mut payload = self.coordinator.get_file(ctx, &meta).await?;
                    tokio::io::copy(&mut payload, &mut dest).await?
                } else {
                    let body = serde_json::to_vec_pretty(&meta.json)?;
                    tokio::io::AsyncWriteExt::write_all(&mut dest, &body).await?;
                    body.len() as u64
                };
                tokio::io::AsyncWriteExt::flush(&mut dest).await?;

                info!(doc = %meta.id, out = %out.display(), bytes = written, "Document written");
            }
            Command::Delete { user, doc } => {
                let user = self.resolve_user(ctx, &user).await?;
                self.coordinator.delete_file(ctx, doc, user).await?;
                info!(doc = %doc, "Delete complete");
            }
            Command::Help => print_help(),
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = Config::from_env()?;
    info!(data_dir = %config.data_dir.display(), b2 = config.b2.is_some(), "Starting DocVault");

    // Ctrl+C cancels whatever is in flight
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling");
            signal_token.cancel();
        }
    });

    let mut ctx = OpContext::with_token(cancel);
    if let Some(timeout) = config.timeout {
        ctx = ctx.with_timeout(timeout);
    }

    let app = App::open(config).await?;
    let result = app.run(&ctx, command).await;
    app.cache.log_metrics();

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}
