//! Self-signed reader root certificates.

use p256::ecdsa::SigningKey;
use rand::random;
use time::{Duration, OffsetDateTime};
use x509_cert::{
    builder::{CertificateBuilder, Profile},
    ext::pkix::{BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier},
    name::Name,
    spki::SubjectPublicKeyInfoOwned,
    Certificate,
};

use super::{key_identifier, sign_certificate, validity, CertificateError};

/// Create a self-signed CA certificate for a reader root key.
///
/// The root may only sign end-entity certificates (path length 0).
pub fn self_signed_root(
    root_key: &SigningKey,
    subject: Name,
    lifetime: Duration,
) -> Result<Certificate, CertificateError> {
    let spki =
        SubjectPublicKeyInfoOwned::from_key(p256::PublicKey::from(root_key.verifying_key()))?;
    let ski = key_identifier(&spki)?;

    let now = OffsetDateTime::now_utc();
    let not_after = now.checked_add(lifetime).ok_or_else(|| {
        CertificateError::Validity(format!("a lifetime of {lifetime} ends out of range"))
    })?;
    let mut builder = CertificateBuilder::new(
        Profile::Manual { issuer: None },
        random::<u64>().into(),
        validity(now, not_after)?,
        subject,
        spki,
        root_key,
    )?;

    builder.add_extension(&SubjectKeyIdentifier(ski))?;
    builder.add_extension(&KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign))?;
    builder.add_extension(&BasicConstraints {
        ca: true,
        path_len_constraint: Some(0),
    })?;

    sign_certificate(builder, root_key)
}
