//! Registered reader app installations.
//!
//! One [`ClientRecord`] exists per registration. It is created once and then only
//! looked up or modified; a missing record means the server lost its data and the
//! client is expected to register again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    attestation::DeviceAttestation,
    cbor::{self, CborError},
    storage::{Storage, StorageError},
};

pub const CLIENT_TABLE: &str = "ReaderBackendClients";

/// Attempts made by [`ClientRegistry::modify`] before giving up on contention.
const MAX_MODIFY_ATTEMPTS: usize = 3;

/// External account linked to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedInUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub device_attestation: DeviceAttestation,
    pub device_is_trusted: bool,
    #[serde(default)]
    pub signed_in_user: Option<SignedInUser>,
    #[serde(default)]
    pub selected_reader_identity: Option<String>,
}

impl ClientRecord {
    pub fn new(device_attestation: DeviceAttestation, device_is_trusted: bool) -> Self {
        Self {
            device_attestation,
            device_is_trusted,
            signed_in_user: None,
            selected_reader_identity: None,
        }
    }

    /// The reader identity selection, honoured only while a user is signed in.
    pub fn effective_reader_identity(&self) -> Option<&str> {
        self.signed_in_user
            .as_ref()
            .and(self.selected_reader_identity.as_deref())
    }

    pub fn sign_out(&mut self) {
        self.signed_in_user = None;
        self.selected_reader_identity = None;
    }
}

/// A record together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub registration_id: String,
    pub record: ClientRecord,
    pub revision: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown registration id")]
    UnknownRegistration,
    #[error("client record for {0} was modified concurrently too often")]
    Contention(String),
    #[error("corrupt client record: {0}")]
    Corrupt(#[from] CborError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Persistence of [`ClientRecord`]s.
pub struct ClientRegistry<S> {
    storage: Arc<S>,
}

impl<S: Storage> ClientRegistry<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Persist a new record and return the registration id assigned to it.
    pub async fn create(&self, record: &ClientRecord) -> Result<String, RegistryError> {
        let data = cbor::to_vec(record)?;
        Ok(self.storage.insert(CLIENT_TABLE, None, data, None).await?)
    }

    /// Look up a registration. Unknown ids yield `None`.
    pub async fn lookup(
        &self,
        registration_id: &str,
    ) -> Result<Option<RegisteredClient>, RegistryError> {
        let Some(stored) = self.storage.get(CLIENT_TABLE, registration_id).await? else {
            return Ok(None);
        };
        Ok(Some(RegisteredClient {
            registration_id: registration_id.to_string(),
            record: cbor::from_slice(&stored.data)?,
            revision: stored.revision,
        }))
    }

    /// Optimistically read, change and write back a record.
    ///
    /// `change` sees the latest stored record and may refuse the change by returning an
    /// error, which is passed through untouched. On a revision conflict the record is
    /// re-read and `change` applied again.
    pub async fn modify<F, E>(&self, registration_id: &str, mut change: F) -> Result<ClientRecord, E>
    where
        F: FnMut(&mut ClientRecord) -> Result<(), E>,
        E: From<RegistryError>,
    {
        for attempt in 1..=MAX_MODIFY_ATTEMPTS {
            let mut client = self
                .lookup(registration_id)
                .await?
                .ok_or(RegistryError::UnknownRegistration)?;
            change(&mut client.record)?;

            let data = cbor::to_vec(&client.record).map_err(RegistryError::from)?;
            match self
                .storage
                .update(CLIENT_TABLE, registration_id, data, client.revision)
                .await
            {
                Ok(_) => return Ok(client.record),
                Err(StorageError::Conflict { .. }) => {
                    tracing::debug!(
                        "client record {registration_id} changed underneath us (attempt {attempt})"
                    );
                }
                Err(StorageError::NotFound { .. }) => {
                    return Err(RegistryError::UnknownRegistration.into())
                }
                Err(e) => return Err(RegistryError::from(e).into()),
            }
        }
        Err(RegistryError::Contention(registration_id.to_string()).into())
    }
}
