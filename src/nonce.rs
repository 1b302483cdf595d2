//! Short-lived, single-use challenges.
//!
//! A nonce is 16 random bytes, handed to the client as their unpadded base64url
//! encoding and stored under that same encoding with a fixed expiration. Every
//! operation that proves liveness consumes the nonce, so a captured
//! `(nonce, assertion)` pair cannot be replayed for a second operation.

use std::sync::Arc;

use rand::RngCore;
use time::{Duration, OffsetDateTime};

use crate::storage::{Storage, StorageError};

pub const NONCE_TABLE: &str = "ReaderBackendNonces";
pub const NONCE_LENGTH: usize = 16;
pub const DEFAULT_NONCE_LIFETIME: Duration = Duration::minutes(5);

#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    #[error("unknown or expired nonce")]
    UnknownNonce,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Issues and consumes nonces backed by a [`Storage`].
pub struct NonceStore<S> {
    storage: Arc<S>,
    lifetime: Duration,
}

impl<S: Storage> NonceStore<S> {
    pub fn new(storage: Arc<S>, lifetime: Duration) -> Self {
        Self { storage, lifetime }
    }

    /// Generate and record a fresh nonce, returning its base64url encoding.
    pub async fn issue(&self) -> Result<String, NonceError> {
        let mut bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = base64::encode_config(bytes, base64::URL_SAFE_NO_PAD);
        let expiration = OffsetDateTime::now_utc() + self.lifetime;
        self.storage
            .insert(NONCE_TABLE, Some(&nonce), vec![], Some(expiration))
            .await?;
        tracing::debug!("issued nonce expiring at {expiration}");
        Ok(nonce)
    }

    /// Whether the nonce is known and not yet expired. Does not consume it.
    pub async fn exists(&self, nonce: &str) -> Result<bool, NonceError> {
        Ok(self.storage.get(NONCE_TABLE, nonce).await?.is_some())
    }

    /// Consume the nonce and return its raw bytes.
    ///
    /// Fails with [`NonceError::UnknownNonce`] if the nonce was never issued, has
    /// expired, was already consumed or is not valid base64url.
    pub async fn consume(&self, nonce: &str) -> Result<Vec<u8>, NonceError> {
        let raw = base64::decode_config(nonce, base64::URL_SAFE_NO_PAD)
            .map_err(|_| NonceError::UnknownNonce)?;
        if raw.len() != NONCE_LENGTH {
            return Err(NonceError::UnknownNonce);
        }
        if !self.storage.delete(NONCE_TABLE, nonce).await? {
            return Err(NonceError::UnknownNonce);
        }
        Ok(raw)
    }
}
