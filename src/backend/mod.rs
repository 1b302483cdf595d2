//! The reader backend service.
//!
//! [`ReaderBackend`] ties the nonce store, the client registry, the key certifier and
//! the trust list together. Every operation except `getNonce` and `register` first
//! authenticates the client with [`ClientAuth`]: the nonce is consumed, the registration
//! looked up and the device assertion checked against the attestation captured at
//! registration.

use std::sync::Arc;

use elliptic_curve::JwkEcKey;
use serde::Deserialize;
use time::Duration;
use tracing::{debug, info, warn};

use crate::{
    attestation::{
        Assertion, AttestationError, AttestationPolicy, DeviceAssertion, DeviceAttestation,
        DeviceAttestationValidator,
    },
    certifier::{
        select_root, KeyCertifier, RootSelection, SubjectKey, DEFAULT_WITH_ACCOUNT_DETAILS,
    },
    client::{ClientRecord, ClientRegistry, RegisteredClient, SignedInUser},
    google::GoogleIdTokenVerifier,
    identity::{ReaderIdentityInfo, ReaderIdentityProvider},
    nonce::{NonceStore, DEFAULT_NONCE_LIFETIME},
    storage::Storage,
    trust_list::{IssuerListUpdate, TrustList},
};

mod error;
pub mod protocol;

pub use error::{Error, ErrorClass, Status};
pub use protocol::Response;

/// Proof that a request comes from a registered, attested installation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAuth {
    /// Absent when the client lost its registration; answered like an unknown id.
    #[serde(default)]
    pub registration_id: Option<String>,
    /// A nonce from `getNonce`, consumed by the request.
    pub nonce: String,
    /// base64url CBOR [`DeviceAssertion`] over the nonce.
    pub device_assertion: String,
}

/// Runtime settings of a backend instance.
#[derive(Debug, Clone)]
pub struct ReaderBackendSettings {
    pub attestation_policy: AttestationPolicy,
    pub nonce_lifetime: Duration,
    pub certifier: KeyCertifier,
    pub trust_list: TrustList,
}

impl ReaderBackendSettings {
    pub fn new(certifier: KeyCertifier) -> Self {
        Self {
            attestation_policy: AttestationPolicy::default(),
            nonce_lifetime: DEFAULT_NONCE_LIFETIME,
            certifier,
            trust_list: TrustList::default(),
        }
    }
}

pub struct ReaderBackend<S, V, G, P = ()> {
    nonces: NonceStore<S>,
    clients: ClientRegistry<S>,
    validator: V,
    id_token_verifier: G,
    identities: P,
    attestation_policy: AttestationPolicy,
    certifier: KeyCertifier,
    trust_list: TrustList,
}

impl<S, V, G, P> ReaderBackend<S, V, G, P>
where
    S: Storage,
    V: DeviceAttestationValidator,
    G: GoogleIdTokenVerifier,
    P: ReaderIdentityProvider,
{
    pub fn new(
        storage: Arc<S>,
        settings: ReaderBackendSettings,
        validator: V,
        id_token_verifier: G,
        identities: P,
    ) -> Self {
        Self {
            nonces: NonceStore::new(storage.clone(), settings.nonce_lifetime),
            clients: ClientRegistry::new(storage),
            validator,
            id_token_verifier,
            identities,
            attestation_policy: settings.attestation_policy,
            certifier: settings.certifier,
            trust_list: settings.trust_list,
        }
    }

    pub async fn get_nonce(&self) -> Result<String, Error> {
        Ok(self.nonces.issue().await?)
    }

    /// Register an installation and return its registration id.
    ///
    /// An attestation that fails validation still registers, as an untrusted device.
    pub async fn register(&self, nonce: &str, device_attestation: &str) -> Result<String, Error> {
        let challenge = self.nonces.consume(nonce).await?;
        let attestation = DeviceAttestation::from_base64url(device_attestation)
            .map_err(|e| Error::InvalidRequest(format!("undecodable device attestation: {e}")))?;

        let device_is_trusted = match self
            .validator
            .validate(&attestation, &challenge, &self.attestation_policy)
            .await
        {
            Ok(()) => self
                .attestation_policy
                .trusts_platform(attestation.platform()),
            Err(e @ AttestationError::Unavailable(_)) => return Err(Error::Attestation(e)),
            Err(e) => {
                warn!(
                    "registering {:?} device as untrusted: {e}",
                    attestation.platform()
                );
                false
            }
        };

        let registration_id = self
            .clients
            .create(&ClientRecord::new(attestation, device_is_trusted))
            .await?;
        info!("registered client {registration_id} (trusted: {device_is_trusted})");
        Ok(registration_id)
    }

    async fn authenticate(&self, auth: &ClientAuth) -> Result<RegisteredClient, Error> {
        let nonce = self.nonces.consume(&auth.nonce).await?;
        let registration_id = auth
            .registration_id
            .as_deref()
            .ok_or(Error::UnknownRegistration)?;
        let client = self
            .clients
            .lookup(registration_id)
            .await?
            .ok_or(Error::UnknownRegistration)?;

        let device_assertion = DeviceAssertion::from_base64url(&auth.device_assertion)
            .map_err(|e| Error::Assertion(format!("undecodable device assertion: {e}")))?;
        match device_assertion.assertion() {
            Ok(Assertion::Nonce { nonce: asserted }) if asserted == nonce => {}
            Ok(_) => {
                return Err(Error::Assertion(
                    "assertion does not cover the request nonce".into(),
                ))
            }
            Err(e) => {
                return Err(Error::Assertion(format!("undecodable assertion: {e}")));
            }
        }
        self.validator
            .validate_assertion(&client.record.device_attestation, &device_assertion)
            .await?;

        debug!("authenticated client {}", client.registration_id);
        Ok(client)
    }

    /// Certify `keys` and return one x5c chain per key, in order.
    pub async fn certify_keys(
        &self,
        auth: &ClientAuth,
        keys: &[JwkEcKey],
        reader_identity: Option<&str>,
    ) -> Result<Vec<Vec<String>>, Error> {
        let client = self.authenticate(auth).await?;
        let keys = keys
            .iter()
            .map(SubjectKey::from_jwk)
            .collect::<Result<Vec<_>, _>>()?;

        let record = &client.record;
        let user = record.signed_in_user.as_ref();
        let requested = reader_identity.or(record.effective_reader_identity());
        let selection = select_root(record.device_is_trusted, user, requested)
            .map_err(|e| Error::Forbidden(e.to_string()))?;

        let root = match &selection {
            RootSelection::TrustedDevice { .. } | RootSelection::UntrustedDevice { .. } => self
                .certifier
                .built_in_root(record.device_is_trusted)
                .clone(),
            RootSelection::Identity(id) => {
                let user = user.ok_or(Error::NotSignedIn)?;
                self.identities
                    .identity_for(user, id)
                    .await?
                    .ok_or_else(|| {
                        Error::Forbidden(format!("reader identity '{id}' is not available"))
                    })?
                    .root
                    .clone()
            }
        };
        let linked_account = user.filter(|_| selection.with_account());

        let chains = self.certifier.certify(&root, keys, linked_account)?;
        info!(
            "certified {} reader keys for {} under {selection:?}",
            chains.len(),
            client.registration_id
        );
        Ok(chains.iter().map(|chain| chain.to_x5c()).collect())
    }

    pub async fn get_issuer_list(
        &self,
        auth: &ClientAuth,
        current_version: Option<u64>,
    ) -> Result<IssuerListUpdate, Error> {
        self.authenticate(auth).await?;
        Ok(self.trust_list.update_for(current_version))
    }

    /// Link the Google account from `id_token` to the registration.
    ///
    /// The token must have been requested with the nonce of this very request.
    pub async fn sign_in(&self, auth: &ClientAuth, id_token: &str) -> Result<(), Error> {
        let client = self.authenticate(auth).await?;
        if client.record.signed_in_user.is_some() {
            return Err(Error::AlreadySignedIn);
        }

        let claims = self.id_token_verifier.verify(id_token).await?;
        if !claims.is_bound_to(&auth.nonce) {
            return Err(Error::IdToken("token nonce does not match the request".into()));
        }
        let user = SignedInUser::from(claims);

        self.clients
            .modify(&client.registration_id, |record| {
                if record.signed_in_user.is_some() {
                    return Err(Error::AlreadySignedIn);
                }
                record.signed_in_user = Some(user.clone());
                record.selected_reader_identity = None;
                Ok(())
            })
            .await?;
        info!("client {} signed in as {}", client.registration_id, user.id);
        Ok(())
    }

    pub async fn sign_out(&self, auth: &ClientAuth) -> Result<(), Error> {
        let client = self.authenticate(auth).await?;
        if client.record.signed_in_user.is_none() {
            return Err(Error::NotSignedIn);
        }

        self.clients
            .modify(&client.registration_id, |record| {
                if record.signed_in_user.is_none() {
                    return Err(Error::NotSignedIn);
                }
                record.sign_out();
                Ok(())
            })
            .await?;
        info!("client {} signed out", client.registration_id);
        Ok(())
    }

    /// Reader identities the signed-in user may select, without key material.
    pub async fn get_reader_identities(
        &self,
        auth: &ClientAuth,
    ) -> Result<Vec<ReaderIdentityInfo>, Error> {
        let client = self.authenticate(auth).await?;
        let user = client
            .record
            .signed_in_user
            .as_ref()
            .ok_or(Error::NotSignedIn)?;

        Ok(self
            .identities
            .identities_for(user)
            .await?
            .iter()
            .map(|identity| ReaderIdentityInfo::from(identity.as_ref()))
            .collect())
    }

    /// Remember (or with `None`, forget) the reader identity used by `certifyKeys`.
    pub async fn select_reader_identity(
        &self,
        auth: &ClientAuth,
        reader_identity: Option<&str>,
    ) -> Result<(), Error> {
        let client = self.authenticate(auth).await?;
        let user = client
            .record
            .signed_in_user
            .as_ref()
            .ok_or(Error::NotSignedIn)?;

        if let Some(id) = reader_identity.filter(|id| *id != DEFAULT_WITH_ACCOUNT_DETAILS) {
            if self.identities.identity_for(user, id).await?.is_none() {
                return Err(Error::Forbidden(format!(
                    "reader identity '{id}' is not available"
                )));
            }
        }

        self.clients
            .modify(&client.registration_id, |record| {
                if record.signed_in_user.as_ref().map(|u| &u.id) != Some(&user.id) {
                    return Err(Error::NotSignedIn);
                }
                record.selected_reader_identity = reader_identity.map(str::to_string);
                Ok(())
            })
            .await?;
        info!(
            "client {} selected reader identity {reader_identity:?}",
            client.registration_id
        );
        Ok(())
    }
}
