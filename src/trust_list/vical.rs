//! Structural parsing of VICALs (ISO/IEC 18013-5 Annex C).
//!
//! Trust list entries carry whole signed VICALs which the reader app verifies itself.
//! The backend only checks that an entry really is a COSE_Sign1 VICAL whose
//! certificates parse, so a broken entry is caught when the configuration is loaded.

use ciborium::Value;
use coset::{iana, CborSerializable, CoseSign1, Label, TaggedCborSerializable};
use der::Decode;
use serde::Deserialize;
use serde_bytes::ByteBuf;
use x509_cert::Certificate;

use crate::x509::X5Chain;

#[derive(Debug, thiserror::Error)]
pub enum VicalError {
    #[error("failed to parse COSE_Sign1: {0}")]
    CoseParse(String),
    #[error("COSE_Sign1 has no payload")]
    MissingPayload,
    #[error("failed to decode VICAL payload: {0}")]
    PayloadDecode(#[from] ciborium::de::Error<std::io::Error>),
    #[error("failed to parse certificate {index} of the VICAL: {source}")]
    CertificateParse {
        index: usize,
        #[source]
        source: der::Error,
    },
    #[error("failed to parse x5chain: {0}")]
    X5Chain(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VicalPayload {
    vical_provider: String,
    #[serde(rename = "vicalIssueID", default)]
    vical_issue_id: Option<u64>,
    certificate_infos: Vec<CertificateInfo>,
}

#[derive(Debug, Deserialize)]
struct CertificateInfo {
    certificate: ByteBuf,
}

/// The parts of a VICAL the backend cares about.
#[derive(Debug)]
pub struct ParsedVical {
    pub provider: String,
    pub issue_id: Option<u64>,
    pub certificates: Vec<Certificate>,
    /// Chain from the COSE_Sign1 unprotected header, if present.
    pub signer: Option<X5Chain>,
}

impl ParsedVical {
    /// Parse a tagged or untagged COSE_Sign1 VICAL without verifying its signature.
    pub fn parse(bytes: &[u8]) -> Result<Self, VicalError> {
        let cose_sign1 = CoseSign1::from_tagged_slice(bytes)
            .or_else(|_| CoseSign1::from_slice(bytes))
            .map_err(|e| VicalError::CoseParse(e.to_string()))?;

        let signer = cose_sign1
            .unprotected
            .rest
            .iter()
            .find(|(label, _)| *label == Label::Int(iana::HeaderParameter::X5Chain as i64))
            .map(|(_, value)| x5chain_from_header(value))
            .transpose()?;

        let payload = cose_sign1.payload.ok_or(VicalError::MissingPayload)?;
        let vical: VicalPayload = ciborium::from_reader(payload.as_slice())?;

        let certificates = vical
            .certificate_infos
            .iter()
            .enumerate()
            .map(|(index, info)| {
                Certificate::from_der(&info.certificate)
                    .map_err(|source| VicalError::CertificateParse { index, source })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            provider: vical.vical_provider,
            issue_id: vical.vical_issue_id,
            certificates,
            signer,
        })
    }
}

/// An x5chain header holds one DER certificate, or an array of them.
fn x5chain_from_header(value: &Value) -> Result<X5Chain, VicalError> {
    let certificates = match value {
        Value::Bytes(der) => vec![der],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Bytes(der) => Ok(der),
                _ => Err(VicalError::X5Chain("x5chain item is not a bstr".into())),
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(VicalError::X5Chain("x5chain is not a bstr or array".into())),
    };

    certificates
        .into_iter()
        .try_fold(X5Chain::builder(), |builder, der| {
            builder.with_der_certificate(der)
        })
        .and_then(|builder| builder.build())
        .map_err(|e| VicalError::X5Chain(e.to_string()))
}
