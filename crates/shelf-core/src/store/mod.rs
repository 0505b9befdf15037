//! Object-store seam.
//!
//! The compaction engine talks to storage only through [`ObjectStore`]. Two
//! implementations ship with the crate: [`FsStore`] maps a bucket onto a
//! directory tree, and [`MemoryStore`] keeps objects in a map for tests and
//! experiments.
//!
//! Result shapes follow the usual object-store contract: `list` degrades to
//! an empty listing on error, `get` fails loudly, `put` reports success or
//! failure as data, and `delete_batch` reports exactly which keys went away.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::document::{self, Metadata};
use crate::error::ErrorCode;

/// Content type used for sidecar objects.
pub const SIDECAR_CONTENT_TYPE: &str = "application/json";

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Outcome of a single put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PutOutcome {
    Stored { key: String, location: String },
    Failed { error: String },
}

impl PutOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Outcome of a batch delete. `deleted` lists only keys the store confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub deleted: Vec<String>,
    pub errors: Vec<String>,
}

/// Errors surfaced by [`ObjectStore::get`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("invalid object key: {key}")]
    InvalidKey { key: String },

    #[error("store I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::ObjectNotFound,
            Self::InvalidKey { .. } | Self::Io { .. } => ErrorCode::StoreUnavailable,
        }
    }
}

/// Key/value object storage scoped to one bucket.
pub trait ObjectStore {
    /// List every object whose key starts with `prefix`. Errors yield an
    /// empty listing.
    fn list(&self, prefix: &str) -> Vec<ObjectInfo>;

    /// Fetch the raw bytes of one object.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the key does not exist, other variants on
    /// backend failure.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store `bytes` at `key`. The content type is recorded when given and
    /// never inferred.
    fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> PutOutcome;

    /// Store the sidecar for content `key`.
    fn put_metadata(&self, key: &str, metadata: &Metadata, source_type: &str) -> PutOutcome {
        match document::encode_sidecar(metadata, source_type, Utc::now()) {
            Ok(bytes) => self.put(
                &document::sidecar_key(key),
                &bytes,
                Some(SIDECAR_CONTENT_TYPE),
            ),
            Err(err) => PutOutcome::Failed {
                error: format!("encode sidecar for {key}: {err}"),
            },
        }
    }

    /// Delete many keys in one call.
    fn delete_batch(&self, keys: &[String]) -> DeleteOutcome;
}

/// Join a directory and filename into an object key, trimming stray slashes.
#[must_use]
pub fn object_key(directory: &str, filename: &str) -> String {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        filename.to_string()
    } else {
        format!("{directory}/{filename}")
    }
}

/// Write content followed by its sidecar.
///
/// The sidecar is only attempted once the content is stored; a content
/// failure is returned as-is. The `source_type` comes from the filename.
pub fn put_with_metadata(
    store: &dyn ObjectStore,
    directory: &str,
    filename: &str,
    content: &[u8],
    metadata: &Metadata,
    content_type: Option<&str>,
) -> PutOutcome {
    let key = object_key(directory, filename);
    let stored = store.put(&key, content, content_type);
    if !stored.is_success() {
        return stored;
    }

    match store.put_metadata(&key, metadata, &document::source_type_for(filename)) {
        PutOutcome::Stored { .. } => stored,
        failed @ PutOutcome::Failed { .. } => failed,
    }
}
