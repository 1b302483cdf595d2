//! Device attestation and assertion model.
//!
//! A client proves it runs as a genuine app installation by sending a platform
//! attestation once, at registration. Afterwards it proves possession of the attested
//! key by signing an [`Assertion`] over a fresh nonce for every request. The
//! cryptographic verification of both lives behind [`DeviceAttestationValidator`];
//! this module only carries the data and the policy handed to the validator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::cbor::{self, CborError};

/// Platform family an attestation was produced on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DevicePlatform {
    Android,
    Ios,
    Web,
}

/// Platform attestation of the key used to sign later assertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceAttestation {
    /// Android Keystore attestation: the attested key's certificate chain, leaf first.
    #[serde(rename_all = "camelCase")]
    Android { certificate_chain: Vec<ByteBuf> },
    /// Apple App Attest attestation object.
    #[serde(rename_all = "camelCase")]
    Ios {
        #[serde(with = "serde_bytes")]
        blob: Vec<u8>,
    },
    /// Attestation expressed as a signed JSON Web Token.
    #[serde(rename_all = "camelCase")]
    JsonWebToken { jwt: String },
}

impl DeviceAttestation {
    pub fn platform(&self) -> DevicePlatform {
        match self {
            DeviceAttestation::Android { .. } => DevicePlatform::Android,
            DeviceAttestation::Ios { .. } => DevicePlatform::Ios,
            DeviceAttestation::JsonWebToken { .. } => DevicePlatform::Web,
        }
    }

    pub fn from_base64url(encoded: &str) -> Result<Self, CborError> {
        cbor::from_base64url(encoded)
    }

    pub fn to_base64url(&self) -> Result<String, CborError> {
        cbor::to_base64url(self)
    }
}

/// Statement signed by the attested key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Assertion {
    /// Proof of liveness over a nonce issued by the backend.
    Nonce {
        #[serde(with = "serde_bytes")]
        nonce: Vec<u8>,
    },
}

/// A signed [`Assertion`] as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAssertion {
    /// CBOR encoding of the [`Assertion`].
    #[serde(with = "serde_bytes")]
    pub assertion_data: Vec<u8>,
    /// Platform-specific signature over `assertion_data`.
    #[serde(with = "serde_bytes")]
    pub platform_assertion: Vec<u8>,
}

impl DeviceAssertion {
    /// Decode the signed statement. Says nothing about the signature's validity.
    pub fn assertion(&self) -> Result<Assertion, CborError> {
        cbor::from_slice(&self.assertion_data)
    }

    pub fn from_base64url(encoded: &str) -> Result<Self, CborError> {
        cbor::from_base64url(encoded)
    }

    pub fn to_base64url(&self) -> Result<String, CborError> {
        cbor::to_base64url(self)
    }
}

/// Platform policy applied when validating attestations at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttestationPolicy {
    /// Reject debuggable / non-release builds of the app.
    pub require_release_build: bool,
    /// App identifiers (package names, bundle ids) allowed to register. Empty allows any.
    pub app_identifiers: Vec<String>,
    /// Require the Google Mobile Services attestation root on Android.
    pub require_gms_attestation: bool,
    /// Require a locked bootloader with verified boot.
    pub require_verified_boot: bool,
    /// Allowed app signing certificate digests (hex SHA-256). Empty allows any.
    pub signing_certificate_digests: Vec<String>,
    /// Platform families whose validated attestations mark a device as trusted.
    pub trusted_platforms: Vec<DevicePlatform>,
}

impl Default for AttestationPolicy {
    fn default() -> Self {
        Self {
            require_release_build: true,
            app_identifiers: vec![],
            require_gms_attestation: true,
            require_verified_boot: true,
            signing_certificate_digests: vec![],
            trusted_platforms: vec![DevicePlatform::Android],
        }
    }
}

impl AttestationPolicy {
    pub fn trusts_platform(&self, platform: DevicePlatform) -> bool {
        self.trusted_platforms.contains(&platform)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    /// The attestation or assertion could not be parsed.
    #[error("malformed attestation data: {0}")]
    Malformed(String),
    /// Parsed fine but failed verification or policy.
    #[error("attestation rejected: {0}")]
    Rejected(String),
    /// The validator could not reach a dependency (e.g. a revocation list).
    #[error("attestation validator unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Verifies device attestations and the assertions made with attested keys.
#[async_trait]
pub trait DeviceAttestationValidator: Send + Sync {
    /// Validate `attestation` for the expected `challenge` under `policy`.
    async fn validate(
        &self,
        attestation: &DeviceAttestation,
        challenge: &[u8],
        policy: &AttestationPolicy,
    ) -> Result<(), AttestationError>;

    /// Check that `assertion` was signed by the key `attestation` vouches for.
    async fn validate_assertion(
        &self,
        attestation: &DeviceAttestation,
        assertion: &DeviceAssertion,
    ) -> Result<(), AttestationError>;
}
