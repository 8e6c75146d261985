//! Backblaze B2 native API access for the blob store
//!
//! Covers exactly what payload storage needs: account authorization,
//! exact-name lookup, streaming upload and download, and version delete.

pub mod client;
pub mod errors;
pub mod types;

pub use client::B2Client;
pub use errors::B2Error;
pub use types::{FileVersion, UploadedFile};
