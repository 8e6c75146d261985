//! Error types
//!
//! `BackendError` is what collaborators (metadata store, blob store, cache,
//! directory) report. `DocError` is what the coordinator and filter engine
//! report to callers; backend failures are wrapped with the component and
//! operation that failed, never reclassified.

use std::fmt;

use crate::b2::B2Error;

/// Which collaborator produced a backend error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    MetadataStore,
    BlobStore,
    Cache,
    Directory,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::MetadataStore => "metadata store",
            Component::BlobStore => "blob store",
            Component::Cache => "metadata cache",
            Component::Directory => "directory",
        };
        f.write_str(name)
    }
}

/// Collaborator failure
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("B2 error: {0}")]
    B2(#[from] B2Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("size mismatch: declared {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("unknown grantee login: {0}")]
    UnknownGrantee(String),

    #[error("{0}")]
    Other(String),
}

/// Result type for collaborator operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors reported by the document access layer
#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("not found")]
    NotFound,

    #[error("unknown filter: {0:?}")]
    UnknownFilter(String),

    #[error("invalid value {value:?} for filter {key}")]
    InvalidFilterValue { key: String, value: String },

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("file document uploaded without a payload stream")]
    MissingPayload,

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("{component} {op} failed: {source}")]
    Backend {
        component: Component,
        op: &'static str,
        #[source]
        source: BackendError,
    },
}

impl DocError {
    /// Wrap a collaborator error with operation context.
    ///
    /// Cancellation and deadline expiry keep their own variants so callers
    /// can tell them apart from store failures.
    pub fn backend(component: Component, op: &'static str, source: BackendError) -> Self {
        match source {
            BackendError::Cancelled => DocError::Cancelled,
            BackendError::DeadlineExceeded => DocError::DeadlineExceeded,
            source => DocError::Backend {
                component,
                op,
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DocError::NotFound)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DocError::Cancelled | DocError::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, DocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_keeps_cancellation_distinct() {
        let err = DocError::backend(Component::Cache, "get", BackendError::Cancelled);
        assert!(matches!(err, DocError::Cancelled));

        let err = DocError::backend(Component::BlobStore, "put", BackendError::DeadlineExceeded);
        assert!(matches!(err, DocError::DeadlineExceeded));
    }

    #[test]
    fn test_backend_error_message_has_context() {
        let err = DocError::backend(
            Component::MetadataStore,
            "upload_metadata",
            BackendError::UnknownGrantee("ghost".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "metadata store upload_metadata failed: unknown grantee login: ghost"
        );
    }
}
