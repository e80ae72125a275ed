//! Object storage abstraction for Keeper.
//!
//! This crate defines the [`StorageBackend`] trait, a flat key/value object
//! store that knows nothing about users, tokens, or items. The object-storage
//! repositories in `keeper-core` serialize each entity into one object and
//! place it under a partitioned key.
//!
//! Two implementations are provided:
//!
//! - [`S3Backend`]: any S3-compatible service (feature `s3-backend`)
//! - [`MemoryBackend`]: in-process, for tests and local development

mod error;
mod memory;
#[cfg(feature = "s3-backend")]
mod s3_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "s3-backend")]
pub use s3_backend::{S3Backend, S3Config};

/// A pluggable key/value object store.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `users/alice.json`,
/// `items/<user>/<name>.json`). Values are opaque byte arrays.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key/value pair, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Store a key/value pair only if the key is not present yet.
    ///
    /// Returns `Ok(true)` when the value was written and `Ok(false)` when the
    /// key already existed. The default implementation is a read followed by
    /// a write and is **not** atomic: two concurrent callers may both observe
    /// the key as absent, and the later write wins. Backends with a native
    /// conditional write override this.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] or [`StorageError::Write`] if the
    /// underlying backend fails.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        if self.exists(key).await? {
            return Ok(false);
        }
        self.put(key, value).await?;
        Ok(true)
    }

    /// Delete a key. Deleting a non-existent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys that start with the given prefix, in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether a key exists in storage.
    ///
    /// The default implementation calls [`get`](StorageBackend::get) and checks
    /// for `Some`. Backends may override this with a cheaper check.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
