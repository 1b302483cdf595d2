//! Versioned distribution of the issuer trust list.
//!
//! Clients remember the version they last received and send it back; they only get
//! the entries again when the list changed.

use der::Decode;
use serde::{Deserialize, Serialize};
use tracing::info;
use x509_cert::Certificate;

use crate::{
    cbor::{self, CborError},
    x509::common_name_or_unknown,
};

pub mod vical;

pub use vical::{ParsedVical, VicalError};

/// Presentation details shown for a trusted issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustEntryMetadata {
    pub display_name: String,
    #[serde(
        default,
        with = "serde_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_icon: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
    #[serde(default)]
    pub test_only: bool,
}

/// One trusted issuer source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssuerTrustEntry {
    /// A single IACA certificate, DER encoded.
    #[serde(rename_all = "camelCase")]
    X509Certificate {
        #[serde(with = "serde_bytes")]
        certificate: Vec<u8>,
        metadata: TrustEntryMetadata,
    },
    /// A signed VICAL, encoded as COSE_Sign1.
    #[serde(rename_all = "camelCase")]
    Vical {
        #[serde(with = "serde_bytes")]
        signed_vical: Vec<u8>,
        metadata: TrustEntryMetadata,
    },
}

impl IssuerTrustEntry {
    pub fn metadata(&self) -> &TrustEntryMetadata {
        match self {
            IssuerTrustEntry::X509Certificate { metadata, .. }
            | IssuerTrustEntry::Vical { metadata, .. } => metadata,
        }
    }

    /// Wire form of the entry: base64url of its CBOR encoding.
    pub fn to_base64url(&self) -> Result<String, CborError> {
        cbor::to_base64url(self)
    }

    pub fn from_base64url(encoded: &str) -> Result<Self, CborError> {
        cbor::from_base64url(encoded)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrustListError {
    #[error("trust list entry {index} is not a DER certificate: {source}")]
    Certificate {
        index: usize,
        #[source]
        source: der::Error,
    },
    #[error("trust list entry {index} is not a VICAL: {source}")]
    Vical {
        index: usize,
        #[source]
        source: VicalError,
    },
    #[error("unable to encode trust list entry: {0}")]
    Encode(#[from] CborError),
}

/// Response to `getIssuerList`. Both fields are absent when the client is up to date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerListUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<String>>,
}

/// An immutable, versioned issuer trust list.
#[derive(Debug, Clone)]
pub struct TrustList {
    version: u64,
    entries: Vec<IssuerTrustEntry>,
    encoded: Vec<String>,
}

impl TrustList {
    /// Check every entry parses and pre-encode the list for distribution.
    pub fn new(version: u64, entries: Vec<IssuerTrustEntry>) -> Result<Self, TrustListError> {
        for (index, entry) in entries.iter().enumerate() {
            match entry {
                IssuerTrustEntry::X509Certificate {
                    certificate,
                    metadata,
                } => {
                    let certificate = Certificate::from_der(certificate)
                        .map_err(|source| TrustListError::Certificate { index, source })?;
                    info!(
                        "trust list entry '{}': certificate {}",
                        metadata.display_name,
                        common_name_or_unknown(&certificate)
                    );
                }
                IssuerTrustEntry::Vical {
                    signed_vical,
                    metadata,
                } => {
                    let vical = ParsedVical::parse(signed_vical)
                        .map_err(|source| TrustListError::Vical { index, source })?;
                    info!(
                        "trust list entry '{}': VICAL from {} with {} certificates",
                        metadata.display_name,
                        vical.provider,
                        vical.certificates.len()
                    );
                }
            }
        }

        let encoded = entries
            .iter()
            .map(IssuerTrustEntry::to_base64url)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            version,
            entries,
            encoded,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[IssuerTrustEntry] {
        &self.entries
    }

    /// What a client holding `current_version` needs to receive.
    pub fn update_for(&self, current_version: Option<u64>) -> IssuerListUpdate {
        if current_version == Some(self.version) {
            return IssuerListUpdate::default();
        }
        IssuerListUpdate {
            version: Some(self.version),
            entries: Some(self.encoded.clone()),
        }
    }
}

impl Default for TrustList {
    fn default() -> Self {
        Self {
            version: 0,
            entries: vec![],
            encoded: vec![],
        }
    }
}
