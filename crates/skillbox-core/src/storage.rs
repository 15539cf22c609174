//! Object-store port.
//!
//! Defines the storage interface the registry and artifact collector are
//! built on. Implementations live in skillbox-infra (S3/MinIO); tests use
//! in-memory fakes. Uses RPITIT (native async fn in traits, Rust 2024
//! edition, no async_trait macro).

use std::time::Duration;

use chrono::{DateTime, Utc};
use skillbox_types::error::StorageError;

/// A stored object as reported by a prefix listing.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Blob storage keyed by `/`-separated paths within a single bucket.
///
/// `put` is idempotent by key. `get` and `delete` report missing keys via
/// [`StorageError::NotFound`].
pub trait ObjectStore: Send + Sync {
    /// Ensure the backing bucket exists, creating it if necessary.
    fn ensure_bucket(&self)
    -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Store an object, replacing any previous content under the key.
    fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Fetch an object's full content.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, StorageError>> + Send;

    /// Remove an object.
    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// List objects under a key prefix.
    fn list(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = Result<Vec<StoredObject>, StorageError>> + Send;

    /// A time-bounded GET URL for an object.
    fn presign_get(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<String, StorageError>> + Send;
}
