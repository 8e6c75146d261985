//! DocVault - document metadata access layer
//!
//! Owner-scoped document metadata in SQLite, payloads in a blob store
//! (local filesystem or Backblaze B2), and a per-owner cache-aside read
//! path with typed filtering.

pub mod b2;
pub mod blob;
pub mod cache;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod filter;
pub mod models;
pub mod store;

pub use context::OpContext;
pub use coordinator::DocumentCoordinator;
pub use error::{BackendError, Component, DocError};
pub use filter::{DocumentFilter, FilterKey, Predicate};
pub use models::{FilesListRequest, Locator, Metadata, NewDocument};
