//! Key-value storage seam used by the nonce store and the client registry.
//!
//! The backend keeps no session state in process: every protocol operation reads and
//! writes through a [`Storage`] implementation, so several backend instances can share
//! one store. Records carry a revision number so callers can perform optimistic
//! read-modify-write cycles with [`Storage::update`].
//!
//! [`MemoryStorage`] is a process-local implementation suitable for tests and
//! single-instance deployments.

use async_trait::async_trait;
use time::OffsetDateTime;

mod memory;

pub use memory::MemoryStorage;

/// A record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Serialized record contents.
    pub data: Vec<u8>,
    /// Revision of the record, incremented on every successful update.
    pub revision: u64,
}

/// Errors that can occur when talking to the store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A record with the given key already exists in the table.
    #[error("record {key} already exists in {table}")]
    AlreadyExists { table: String, key: String },

    /// The record was updated by someone else since it was read.
    #[error("record {key} in {table} was modified concurrently")]
    Conflict { table: String, key: String },

    /// The record to update does not exist (or has expired).
    #[error("record {key} not found in {table}")]
    NotFound { table: String, key: String },

    /// The storage engine itself failed.
    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Asynchronous key-value store with per-record expiration and revisions.
// TODO: Remove async_trait once native async fn in traits supports dyn dispatch.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch a live record. Expired records are reported as absent.
    async fn get(&self, table: &str, key: &str) -> Result<Option<StoredRecord>, StorageError>;

    /// Insert a new record and return its key.
    ///
    /// When `key` is `None` the store assigns a fresh unique key.
    async fn insert(
        &self,
        table: &str,
        key: Option<&str>,
        data: Vec<u8>,
        expiration: Option<OffsetDateTime>,
    ) -> Result<String, StorageError>;

    /// Replace the contents of a record if its revision is still `expected_revision`.
    async fn update(
        &self,
        table: &str,
        key: &str,
        data: Vec<u8>,
        expected_revision: u64,
    ) -> Result<u64, StorageError>;

    /// Delete a record, returning whether a live record was removed.
    async fn delete(&self, table: &str, key: &str) -> Result<bool, StorageError>;
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    async fn get(&self, table: &str, key: &str) -> Result<Option<StoredRecord>, StorageError> {
        (**self).get(table, key).await
    }

    async fn insert(
        &self,
        table: &str,
        key: Option<&str>,
        data: Vec<u8>,
        expiration: Option<OffsetDateTime>,
    ) -> Result<String, StorageError> {
        (**self).insert(table, key, data, expiration).await
    }

    async fn update(
        &self,
        table: &str,
        key: &str,
        data: Vec<u8>,
        expected_revision: u64,
    ) -> Result<u64, StorageError> {
        (**self).update(table, key, data, expected_revision).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StorageError> {
        (**self).delete(table, key).await
    }
}
