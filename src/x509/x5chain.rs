use anyhow::{anyhow, bail, Context, Error, Result};
use const_oid::AssociatedOid;
use ecdsa::{PrimeCurve, VerifyingKey};
use elliptic_curve::{
    sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint},
    AffinePoint, CurveArithmetic, FieldBytesSize,
};
use x509_cert::der::Encode;
use x509_cert::{certificate::Certificate, der::Decode};

use super::util::{common_name_or_unknown, public_key};

/// A parsed certificate kept together with the exact DER it was read from, so x5c
/// rendering never re-encodes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CertificateWithDer {
    pub inner: Certificate,
    der: Vec<u8>,
}

impl CertificateWithDer {
    /// Parse a single PEM `CERTIFICATE` block.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let (label, der) = pem_rfc7468::decode_vec(pem)
            .map_err(|e| anyhow!("certificate is not valid PEM: {e}"))?;
        if label != "CERTIFICATE" {
            bail!("expected a CERTIFICATE PEM block, found {label}");
        }
        Self::from_der(&der)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: Certificate::from_der(der).context("certificate is not valid DER")?,
            der: der.to_vec(),
        })
    }

    pub fn from_cert(inner: Certificate) -> Result<Self> {
        let der = inner.to_der().context("unable to DER encode certificate")?;
        Ok(Self { inner, der })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

/// Certificate chain ordered from the end-entity certificate towards the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X5Chain(Vec<CertificateWithDer>);

impl X5Chain {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Parse every PEM certificate block in `pem`, in order.
    pub fn from_pem_chain(pem: &[u8]) -> Result<Self> {
        Certificate::load_pem_chain(pem)
            .map_err(|e| anyhow!("unable to parse PEM certificate chain: {e}"))?
            .into_iter()
            .try_fold(Self::builder(), Builder::with_certificate)?
            .build()
    }

    /// Render the chain as a JWS `x5c` array: standard base64 of each DER certificate.
    pub fn to_x5c(&self) -> Vec<String> {
        self.iter().map(|certificate| base64::encode(certificate.der())).collect()
    }

    pub fn from_x5c<S: AsRef<str>>(x5c: &[S]) -> Result<Self, Error> {
        x5c.iter()
            .try_fold(Self::builder(), |builder, encoded| {
                let der = base64::decode(encoded.as_ref())
                    .context("x5c entry is not standard base64")?;
                builder.with_der_certificate(&der)
            })?
            .build()
    }

    /// The certificate the chain vouches for.
    pub fn end_entity_certificate(&self) -> &Certificate {
        &self.0[0].inner
    }

    pub fn end_entity_public_key<C>(&self) -> Result<VerifyingKey<C>, Error>
    where
        C: AssociatedOid + CurveArithmetic + PrimeCurve,
        AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
        FieldBytesSize<C>: ModulusSize,
    {
        public_key(self.end_entity_certificate())
    }

    pub fn end_entity_common_name(&self) -> &str {
        common_name_or_unknown(self.end_entity_certificate())
    }

    /// The last certificate of the chain, closest to (or being) the trust anchor.
    pub fn root_entity_certificate(&self) -> &Certificate {
        // Builder refuses empty chains.
        &self.0[self.0.len() - 1].inner
    }

    pub fn root_entity_common_name(&self) -> &str {
        common_name_or_unknown(self.root_entity_certificate())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertificateWithDer> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Collects certificates, end entity first, into an [`X5Chain`].
#[derive(Default, Debug, Clone)]
pub struct Builder {
    certificates: Vec<CertificateWithDer>,
}

impl Builder {
    pub fn with_certificate(mut self, certificate: Certificate) -> Result<Builder> {
        self.certificates
            .push(CertificateWithDer::from_cert(certificate)?);
        Ok(self)
    }

    /// Append every certificate of `chain`, preserving its order.
    pub fn with_chain(mut self, chain: &X5Chain) -> Builder {
        self.certificates.extend(chain.iter().cloned());
        self
    }

    pub fn with_der_certificate(mut self, der: &[u8]) -> Result<Builder> {
        self.certificates.push(CertificateWithDer::from_der(der)?);
        Ok(self)
    }

    pub fn build(self) -> Result<X5Chain> {
        if self.certificates.is_empty() {
            bail!("a certificate chain needs at least one certificate");
        }
        Ok(X5Chain(self.certificates))
    }
}
