//! Runtime configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::coordinator::DEFAULT_CACHE_TTL;

/// Default cap on owners kept in the metadata cache
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Default largest payload the CLI will upload (64 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// B2 credentials and target bucket
#[derive(Debug, Clone)]
pub struct B2Settings {
    pub key_id: String,
    pub key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Holds the SQLite database, local blobs and download spool
    pub data_dir: PathBuf,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    pub max_upload_bytes: u64,
    /// Per-operation deadline, none if unset
    pub timeout: Option<Duration>,
    /// B2 backend; local filesystem blobs when `None`
    pub b2: Option<B2Settings>,
}

impl Config {
    /// Read configuration from `DOCVAULT_*` and `B2_*` variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("DOCVAULT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow!("No platform data directory; set DOCVAULT_DATA_DIR"))?
                .join("docvault"),
        };

        let cache_ttl = parse_u64(&lookup, "DOCVAULT_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL);
        let cache_capacity =
            parse_u64(&lookup, "DOCVAULT_CACHE_CAPACITY")?.unwrap_or(DEFAULT_CACHE_CAPACITY);
        let max_upload_bytes =
            parse_u64(&lookup, "DOCVAULT_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let timeout = parse_u64(&lookup, "DOCVAULT_TIMEOUT_SECS")?.map(Duration::from_secs);

        let b2 = match (lookup("B2_KEY_ID"), lookup("B2_KEY"), lookup("B2_BUCKET")) {
            (Some(key_id), Some(key), Some(bucket)) => Some(B2Settings { key_id, key, bucket }),
            (None, None, None) => None,
            _ => return Err(anyhow!("B2_KEY_ID, B2_KEY and B2_BUCKET must be set together")),
        };

        Ok(Self {
            data_dir,
            cache_ttl,
            cache_capacity,
            max_upload_bytes,
            timeout,
            b2,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("metadata.db")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.data_dir.join("spool")
    }
}

fn parse_u64<F>(lookup: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a non-negative integer, got {:?}", name, raw))
        })
        .transpose()
}
