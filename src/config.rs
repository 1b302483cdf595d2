//! Deployment configuration.
//!
//! A backend deployment is described by one JSON document:
//!
//! ```json
//! {
//!   "attestationPolicy": { "appIdentifiers": ["com.example.reader"] },
//!   "certificateValidityDays": 30,
//!   "nonceLifetimeSeconds": 300,
//!   "trustedRoot": { "privateKeyPem": "...", "certificateChainPem": "..." },
//!   "untrustedRoot": { "privateKeyPem": "...", "certificateChainPem": "..." },
//!   "issuerTrustList": {
//!     "version": 4,
//!     "entries": [
//!       { "type": "x509Certificate", "certificatePem": "...", "displayName": "Example DMV" },
//!       { "type": "vical", "signedVical": "<base64>", "displayName": "AAMVA", "testOnly": true }
//!     ]
//!   },
//!   "readerIdentities": [
//!     {
//!       "id": "acme",
//!       "displayName": "ACME Security",
//!       "privateKeyPem": "...",
//!       "certificateChainPem": "...",
//!       "allowedAccounts": ["@acme.example"]
//!     }
//!   ]
//! }
//! ```

use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::info;

use crate::{
    attestation::AttestationPolicy,
    backend::ReaderBackendSettings,
    certifier::{KeyCertifier, ReaderRoot},
    identity::{ConfiguredReaderIdentities, ReaderIdentity},
    trust_list::{IssuerTrustEntry, TrustEntryMetadata, TrustList},
    x509::CertificateWithDer,
};

const DEFAULT_CERTIFICATE_VALIDITY_DAYS: u32 = 30;
const DEFAULT_NONCE_LIFETIME_SECONDS: u32 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderBackendConfig {
    #[serde(default)]
    pub attestation_policy: AttestationPolicy,
    #[serde(default = "default_certificate_validity_days")]
    pub certificate_validity_days: u32,
    #[serde(default = "default_nonce_lifetime_seconds")]
    pub nonce_lifetime_seconds: u32,
    pub trusted_root: RootConfig,
    pub untrusted_root: RootConfig,
    #[serde(default)]
    pub issuer_trust_list: TrustListConfig,
    #[serde(default)]
    pub reader_identities: Vec<ReaderIdentityConfig>,
}

fn default_certificate_validity_days() -> u32 {
    DEFAULT_CERTIFICATE_VALIDITY_DAYS
}

fn default_nonce_lifetime_seconds() -> u32 {
    DEFAULT_NONCE_LIFETIME_SECONDS
}

/// A signing key (PKCS#8 PEM) and its certificate chain (PEM, leaf first).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootConfig {
    pub private_key_pem: String,
    pub certificate_chain_pem: String,
}

impl RootConfig {
    pub fn load(&self) -> Result<ReaderRoot> {
        ReaderRoot::from_pem(&self.private_key_pem, &self.certificate_chain_pem)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustListConfig {
    pub version: u64,
    #[serde(default)]
    pub entries: Vec<TrustEntryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustEntryMetadataConfig {
    pub display_name: String,
    /// Standard base64 image.
    #[serde(default)]
    pub display_icon: Option<String>,
    #[serde(default)]
    pub privacy_policy_url: Option<String>,
    #[serde(default)]
    pub test_only: bool,
}

impl TrustEntryMetadataConfig {
    fn load(&self) -> Result<TrustEntryMetadata> {
        Ok(TrustEntryMetadata {
            display_name: self.display_name.clone(),
            display_icon: decode_icon(self.display_icon.as_deref())?,
            privacy_policy_url: self.privacy_policy_url.clone(),
            test_only: self.test_only,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrustEntryConfig {
    #[serde(rename_all = "camelCase")]
    X509Certificate {
        certificate_pem: String,
        #[serde(flatten)]
        metadata: TrustEntryMetadataConfig,
    },
    #[serde(rename_all = "camelCase")]
    Vical {
        /// Standard base64 of the COSE_Sign1 VICAL.
        signed_vical: String,
        #[serde(flatten)]
        metadata: TrustEntryMetadataConfig,
    },
}

impl TrustEntryConfig {
    fn load(&self) -> Result<IssuerTrustEntry> {
        let entry = match self {
            TrustEntryConfig::X509Certificate {
                certificate_pem,
                metadata,
            } => IssuerTrustEntry::X509Certificate {
                certificate: CertificateWithDer::from_pem(certificate_pem.as_bytes())
                    .with_context(|| format!("certificate of '{}'", metadata.display_name))?
                    .der()
                    .to_vec(),
                metadata: metadata.load()?,
            },
            TrustEntryConfig::Vical {
                signed_vical,
                metadata,
            } => IssuerTrustEntry::Vical {
                signed_vical: base64::decode(signed_vical)
                    .with_context(|| format!("VICAL of '{}'", metadata.display_name))?,
                metadata: metadata.load()?,
            },
        };
        Ok(entry)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderIdentityConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub display_icon: Option<String>,
    pub private_key_pem: String,
    pub certificate_chain_pem: String,
    /// Account patterns: `*`, `@domain` or an email address.
    #[serde(default)]
    pub allowed_accounts: Vec<String>,
}

fn decode_icon(icon: Option<&str>) -> Result<Option<Vec<u8>>> {
    icon.map(|icon| base64::decode(icon).context("display icon is not base64"))
        .transpose()
}

impl ReaderBackendConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid reader backend configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("while loading {}", path.display()))
    }

    /// Load keys and trust list into runtime settings.
    pub fn settings(&self) -> Result<ReaderBackendSettings> {
        let trusted_root = self.trusted_root.load().context("trusted root")?;
        let untrusted_root = self.untrusted_root.load().context("untrusted root")?;
        info!(
            "reader roots: trusted '{}', untrusted '{}'",
            trusted_root.chain().end_entity_common_name(),
            untrusted_root.chain().end_entity_common_name()
        );
        let certifier = KeyCertifier::new(
            Arc::new(trusted_root),
            Arc::new(untrusted_root),
            Duration::days(self.certificate_validity_days.into()),
        )?;

        let entries = self
            .issuer_trust_list
            .entries
            .iter()
            .map(TrustEntryConfig::load)
            .collect::<Result<Vec<_>>>()?;
        let trust_list = TrustList::new(self.issuer_trust_list.version, entries)
            .context("issuer trust list")?;
        info!(
            "issuer trust list version {} with {} entries",
            trust_list.version(),
            trust_list.entries().len()
        );

        Ok(ReaderBackendSettings {
            attestation_policy: self.attestation_policy.clone(),
            nonce_lifetime: Duration::seconds(self.nonce_lifetime_seconds.into()),
            certifier,
            trust_list,
        })
    }

    pub fn reader_identities(&self) -> Result<ConfiguredReaderIdentities> {
        let mut identities = ConfiguredReaderIdentities::new();
        for config in &self.reader_identities {
            let root = ReaderRoot::from_pem(&config.private_key_pem, &config.certificate_chain_pem)
                .with_context(|| format!("reader identity '{}'", config.id))?;
            let identity = ReaderIdentity {
                id: config.id.clone(),
                display_name: config.display_name.clone(),
                display_icon: decode_icon(config.display_icon.as_deref())?,
                root: Arc::new(root),
            };
            identities = identities.with_identity(identity, &config.allowed_accounts);
        }
        info!("{} reader identities configured", identities.len());
        Ok(identities)
    }
}
