//! Certification of ephemeral reader keys.

use std::{str::FromStr, sync::Arc};

use const_oid::ObjectIdentifier;
use elliptic_curve::JwkEcKey;
use rand::random;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use x509_cert::{
    builder::{CertificateBuilder, Profile},
    ext::pkix::{
        AuthorityKeyIdentifier, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectKeyIdentifier,
    },
    name::Name,
    spki::SubjectPublicKeyInfoOwned,
};

use crate::{
    cbor::CborError,
    client::SignedInUser,
    x509::{
        extensions::LinkedAccount, key_identifier, sign_certificate, validity, CertificateError,
        X5Chain,
    },
};

pub mod jitter;
pub mod root;
pub mod selection;

use jitter::{latest_not_after, validity_windows, ValidityWindow, MAX_JITTER};
pub use root::ReaderRoot;
pub use selection::{select_root, RootSelection, DEFAULT_WITH_ACCOUNT_DETAILS};

/// Extended key usage for mdoc reader authentication (ISO/IEC 18013-5).
pub const MDOC_READER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.0.18013.5.1.6");

/// Subject of every issued reader key certificate.
pub const READER_KEY_SUBJECT: &str = "CN=mdoc reader key";

pub const DEFAULT_CERTIFICATE_VALIDITY: Duration = Duration::days(30);

/// Most keys certified in one request.
pub const MAX_KEYS_PER_BATCH: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum CertifyError {
    #[error("unsupported key curve: {0}")]
    UnsupportedCurve(String),
    #[error("invalid public key: {0}")]
    InvalidKey(#[from] elliptic_curve::Error),
    #[error("certificate validity {0} must exceed the 12 hour jitter")]
    ValidityTooShort(Duration),
    #[error("certificate validity {0} ends beyond the representable date range")]
    ValidityTooLong(Duration),
    #[error("{0} keys requested, at most {max} may be certified at once", max = MAX_KEYS_PER_BATCH)]
    TooManyKeys(usize),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("unable to encode linked account: {0}")]
    LinkedAccount(#[from] CborError),
    #[error("unable to assemble certificate chain: {0}")]
    Chain(String),
}

impl From<der::Error> for CertifyError {
    fn from(value: der::Error) -> Self {
        CertifyError::Certificate(value.into())
    }
}

impl From<x509_cert::builder::Error> for CertifyError {
    fn from(value: x509_cert::builder::Error) -> Self {
        CertifyError::Certificate(value.into())
    }
}

/// A public key submitted for certification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
}

impl SubjectKey {
    pub fn from_jwk(jwk: &JwkEcKey) -> Result<Self, CertifyError> {
        match jwk.crv() {
            "P-256" => Ok(SubjectKey::P256(p256::PublicKey::from_jwk(jwk)?)),
            "P-384" => Ok(SubjectKey::P384(p384::PublicKey::from_jwk(jwk)?)),
            other => Err(CertifyError::UnsupportedCurve(other.to_string())),
        }
    }

    fn into_spki(self) -> Result<SubjectPublicKeyInfoOwned, CertificateError> {
        let spki = match self {
            SubjectKey::P256(key) => SubjectPublicKeyInfoOwned::from_key(key)?,
            SubjectKey::P384(key) => SubjectPublicKeyInfoOwned::from_key(key)?,
        };
        Ok(spki)
    }
}

/// Issues reader key certificates under the built-in roots or a reader identity.
#[derive(Debug, Clone)]
pub struct KeyCertifier {
    trusted_root: Arc<ReaderRoot>,
    untrusted_root: Arc<ReaderRoot>,
    validity: Duration,
}

impl KeyCertifier {
    pub fn new(
        trusted_root: Arc<ReaderRoot>,
        untrusted_root: Arc<ReaderRoot>,
        validity: Duration,
    ) -> Result<Self, CertifyError> {
        if validity <= MAX_JITTER {
            return Err(CertifyError::ValidityTooShort(validity));
        }
        if latest_not_after(OffsetDateTime::now_utc(), validity).is_none() {
            return Err(CertifyError::ValidityTooLong(validity));
        }
        Ok(Self {
            trusted_root,
            untrusted_root,
            validity,
        })
    }

    pub fn built_in_root(&self, device_is_trusted: bool) -> &Arc<ReaderRoot> {
        if device_is_trusted {
            &self.trusted_root
        } else {
            &self.untrusted_root
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Certify every key under `root`, or none of them.
    ///
    /// Each returned chain starts with the new certificate followed by the root's chain.
    pub fn certify(
        &self,
        root: &ReaderRoot,
        keys: Vec<SubjectKey>,
        linked_account: Option<&SignedInUser>,
    ) -> Result<Vec<X5Chain>, CertifyError> {
        if keys.len() > MAX_KEYS_PER_BATCH {
            return Err(CertifyError::TooManyKeys(keys.len()));
        }
        let linked_account = linked_account.map(LinkedAccount::new).transpose()?;
        let windows = validity_windows(
            &mut rand::thread_rng(),
            OffsetDateTime::now_utc(),
            self.validity,
            keys.len(),
        )
        .ok_or(CertifyError::ValidityTooLong(self.validity))?;

        keys.into_iter()
            .zip(windows)
            .map(|(key, window)| issue(root, key, window, linked_account.as_ref()))
            .collect()
    }
}

fn issue(
    root: &ReaderRoot,
    key: SubjectKey,
    window: ValidityWindow,
    linked_account: Option<&LinkedAccount>,
) -> Result<X5Chain, CertifyError> {
    let root_certificate = &root.chain().end_entity_certificate().tbs_certificate;
    let spki = key.into_spki()?;
    let ski = key_identifier(&spki)?;
    let aki = key_identifier(&root_certificate.subject_public_key_info)?;

    let mut builder = CertificateBuilder::new(
        Profile::Manual {
            issuer: Some(root_certificate.subject.clone()),
        },
        random::<u64>().into(),
        validity(window.not_before, window.not_after)?,
        Name::from_str(READER_KEY_SUBJECT)?,
        spki,
        root.signing_key(),
    )?;

    builder.add_extension(&SubjectKeyIdentifier(ski))?;
    builder.add_extension(&AuthorityKeyIdentifier {
        key_identifier: Some(aki),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    })?;
    builder.add_extension(&KeyUsage(KeyUsages::DigitalSignature.into()))?;
    builder.add_extension(&ExtendedKeyUsage(vec![MDOC_READER_AUTH]))?;
    if let Some(linked_account) = linked_account {
        builder.add_extension(linked_account)?;
    }

    let certificate = sign_certificate(builder, root.signing_key())?;
    debug!(
        "issued reader certificate valid {} to {}",
        window.not_before, window.not_after
    );

    X5Chain::builder()
        .with_certificate(certificate)
        .map(|builder| builder.with_chain(root.chain()))
        .and_then(|builder| builder.build())
        .map_err(|e| CertifyError::Chain(e.to_string()))
}
