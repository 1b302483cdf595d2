use std::fmt;

use anyhow::{bail, Context, Result};
use p256::{ecdsa::SigningKey, pkcs8::DecodePrivateKey};

use crate::x509::{signature::verify_issued_by, X5Chain};

/// A certificate authority key used to sign ephemeral reader key certificates.
#[derive(Clone)]
pub struct ReaderRoot {
    signing_key: SigningKey,
    chain: X5Chain,
}

impl fmt::Debug for ReaderRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderRoot")
            .field("subject", &self.chain.end_entity_common_name())
            .field("chain_length", &self.chain.len())
            .finish_non_exhaustive()
    }
}

impl ReaderRoot {
    /// Pair a signing key with its certificate chain.
    ///
    /// The first certificate of `chain` must certify the public half of `signing_key`, and
    /// every certificate must be signed by the one after it.
    pub fn new(signing_key: SigningKey, chain: X5Chain) -> Result<Self> {
        let certified: p256::ecdsa::VerifyingKey = chain
            .end_entity_public_key()
            .context("reader root certificate does not hold a P-256 key")?;
        if &certified != signing_key.verifying_key() {
            bail!(
                "reader root certificate '{}' does not match its signing key",
                chain.end_entity_common_name()
            );
        }
        let certificates: Vec<_> = chain.iter().map(|c| &c.inner).collect();
        for (index, pair) in certificates.windows(2).enumerate() {
            verify_issued_by(pair[0], pair[1]).with_context(|| {
                format!("reader root chain link {index} is not signed by its successor")
            })?;
        }
        Ok(Self { signing_key, chain })
    }

    /// Load a PKCS#8 PEM private key and a PEM certificate chain.
    pub fn from_pem(private_key_pem: &str, certificate_chain_pem: &str) -> Result<Self> {
        let signing_key = SigningKey::from_pkcs8_pem(private_key_pem)
            .map_err(|e| anyhow::anyhow!("unable to parse PKCS#8 private key: {e}"))?;
        let chain = X5Chain::from_pem_chain(certificate_chain_pem.as_bytes())?;
        Self::new(signing_key, chain)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn chain(&self) -> &X5Chain {
        &self.chain
    }
}
