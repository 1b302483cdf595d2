//! X.509 plumbing for reader roots and the certificates they issue.

use std::time::SystemTime;

use p256::{ecdsa::SigningKey, NistP256};
use ::signature::Signer;
use time::OffsetDateTime;
use x509_cert::{
    builder::{Builder as _, CertificateBuilder},
    spki::SignatureBitStringEncoding,
    time::{Time, Validity},
    Certificate,
};

pub mod extensions;
pub mod root;
pub mod signature;
mod util;
pub mod x5chain;

pub use util::{common_name_or_unknown, key_identifier, public_key};
pub use x5chain::{Builder, CertificateWithDer, X5Chain};

/// Errors raised while assembling a certificate.
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("DER encoding failed: {0}")]
    Der(#[from] der::Error),
    #[error("invalid subject public key: {0}")]
    Spki(#[from] x509_cert::spki::Error),
    #[error("certificate builder failed: {0}")]
    Builder(String),
    #[error("invalid validity period: {0}")]
    Validity(String),
}

impl From<x509_cert::builder::Error> for CertificateError {
    fn from(value: x509_cert::builder::Error) -> Self {
        CertificateError::Builder(value.to_string())
    }
}

/// Validity period spanning `not_before` to `not_after`.
pub fn validity(
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> Result<Validity, CertificateError> {
    if not_after <= not_before {
        return Err(CertificateError::Validity(format!(
            "{not_after} is not after {not_before}"
        )));
    }
    Ok(Validity {
        not_before: Time::try_from(SystemTime::from(not_before))?,
        not_after: Time::try_from(SystemTime::from(not_after))?,
    })
}

/// Sign a prepared certificate with an ECDSA P-256 key.
pub(crate) fn sign_certificate(
    mut builder: CertificateBuilder<'_, SigningKey>,
    key: &SigningKey,
) -> Result<Certificate, CertificateError> {
    let signature: ecdsa::Signature<NistP256> = key.sign(&builder.finalize()?);
    Ok(builder.assemble(signature.to_der().to_bitstring()?)?)
}
