//! Certificate signature checks for reader root chains.

use const_oid::{
    db::rfc5912::{ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384},
    ObjectIdentifier,
};
use der::Encode;
use ecdsa::signature::Verifier;
use x509_cert::Certificate;

use super::util::public_key;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("unsupported signature algorithm {0}")]
    UnsupportedAlgorithm(ObjectIdentifier),
    #[error("issuer does not hold a key for the signature algorithm: {0}")]
    IssuerKey(String),
    #[error("signature does not verify: {0}")]
    Invalid(#[from] ecdsa::Error),
    #[error("unable to encode the signed part of the certificate: {0}")]
    Der(#[from] der::Error),
}

/// Verify that `issuer`'s key produced the signature on `subject`.
///
/// Only ECDSA over P-256/SHA-256 and P-384/SHA-384 is accepted.
pub fn verify_issued_by(subject: &Certificate, issuer: &Certificate) -> Result<(), SignatureError> {
    let tbs = subject.tbs_certificate.to_der()?;
    let signature = subject.signature.raw_bytes();
    let issuer_key = |e: anyhow::Error| SignatureError::IssuerKey(e.to_string());

    let algorithm = subject.signature_algorithm.oid;
    if algorithm == ECDSA_WITH_SHA_256 {
        let key: p256::ecdsa::VerifyingKey = public_key(issuer).map_err(issuer_key)?;
        key.verify(&tbs, &p256::ecdsa::Signature::from_der(signature)?)?;
    } else if algorithm == ECDSA_WITH_SHA_384 {
        let key: p384::ecdsa::VerifyingKey = public_key(issuer).map_err(issuer_key)?;
        key.verify(&tbs, &p384::ecdsa::Signature::from_der(signature)?)?;
    } else {
        return Err(SignatureError::UnsupportedAlgorithm(algorithm));
    }
    Ok(())
}
