//! Document metadata types
//!
//! A document is either a binary file (payload in the blob store) or an
//! inline JSON document (payload in the metadata row itself).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DocError;

/// Stored document metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Assigned by the metadata store on insert
    pub id: Uuid,
    /// Originating user, never changes
    #[serde(rename = "owner_id")]
    pub owner_id: Uuid,
    pub name: String,
    #[serde(rename = "file")]
    pub is_file: bool,
    #[serde(rename = "public")]
    pub is_public: bool,
    pub mime: String,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    /// Logins with read access
    #[serde(rename = "grant", default)]
    pub grants: Vec<String>,
    /// Inline payload, only for non-file documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    /// Payload size in bytes, only for file documents
    #[serde(rename = "file-size", default)]
    pub file_size: u64,
}

impl Metadata {
    /// Blob store key for this record's payload
    pub fn locator(&self) -> Locator {
        Locator::new(self.owner_id, self.id)
    }
}

/// Metadata for a document that has not been stored yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub owner_id: Uuid,
    pub name: String,
    pub is_file: bool,
    pub is_public: bool,
    pub mime: String,
    #[serde(default)]
    pub grants: Vec<String>,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub file_size: u64,
}

impl NewDocument {
    /// Describe a binary file document
    pub fn file(owner_id: Uuid, name: impl Into<String>, mime: impl Into<String>, size: u64) -> Self {
        Self {
            owner_id,
            name: name.into(),
            is_file: true,
            is_public: false,
            mime: mime.into(),
            grants: Vec::new(),
            json: None,
            file_size: size,
        }
    }

    /// Describe an inline JSON document
    pub fn json(owner_id: Uuid, name: impl Into<String>, json: serde_json::Value) -> Self {
        Self {
            owner_id,
            name: name.into(),
            is_file: false,
            is_public: false,
            mime: "application/json".to_string(),
            grants: Vec::new(),
            json: Some(json),
            file_size: 0,
        }
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn grant(mut self, login: impl Into<String>) -> Self {
        self.grants.push(login.into());
        self
    }

    /// Check the file/inline invariant and normalize the grant set.
    ///
    /// Grants are sorted by login with duplicates removed, the order the
    /// store reads them back in.
    pub fn validate(mut self) -> Result<Self, DocError> {
        if self.name.is_empty() {
            return Err(DocError::InvalidMetadata("document name is empty".to_string()));
        }
        if self.is_file {
            if self.file_size == 0 {
                return Err(DocError::InvalidMetadata(
                    "file document must declare a non-zero size".to_string(),
                ));
            }
            if self.json.is_some() {
                return Err(DocError::InvalidMetadata(
                    "file document cannot carry inline json".to_string(),
                ));
            }
        } else if self.file_size != 0 {
            return Err(DocError::InvalidMetadata(
                "inline document cannot declare a file size".to_string(),
            ));
        }

        self.grants.sort();
        self.grants.dedup();

        Ok(self)
    }

    /// Build the stored record once the store has assigned identity
    pub fn into_metadata(self, id: Uuid, created_at: DateTime<Utc>) -> Metadata {
        Metadata {
            id,
            owner_id: self.owner_id,
            name: self.name,
            is_file: self.is_file,
            is_public: self.is_public,
            mime: self.mime,
            created_at,
            grants: self.grants,
            json: self.json,
            file_size: self.file_size,
        }
    }
}

/// Blob store address of a document payload: `owner_id:id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    owner_id: Uuid,
    id: Uuid,
}

impl Locator {
    pub fn new(owner_id: Uuid, id: Uuid) -> Self {
        Self { owner_id, id }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_id, self.id)
    }
}

/// Listing request for one owner's documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesListRequest {
    /// Look up another owner by login instead of the requesting user
    #[serde(default)]
    pub login: Option<String>,
    pub key: String,
    pub value: String,
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}
