//! Private certificate extension describing the account linked to a reader.
//!
//! Issued reader certificates may carry the Google account the reader app is signed
//! in with, so a verifier can show who vouched for the reader. The extension is never
//! critical: verifiers that do not understand it ignore it, and the account claim is
//! weaker than the attestation-backed choice of root.

use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{asn1::OctetString, Decode, EncodeValue, FixedTag, Length, Tag, Writer};
use serde::{Deserialize, Serialize};
use x509_cert::{
    ext::{AsExtension, Extension},
    name::Name,
    Certificate,
};

use crate::{
    cbor::{self, CborError},
    client::SignedInUser,
};

/// OID of the linked-account extension.
pub const LINKED_ACCOUNT_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.1.40");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkedAccountPayload {
    google_account: SignedInUser,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkedAccountError {
    #[error("extension value is not an OCTET STRING: {0}")]
    Der(#[from] der::Error),
    #[error("extension payload is not valid CBOR: {0}")]
    Cbor(#[from] CborError),
}

/// Linked-account extension value: an OCTET STRING holding a CBOR map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAccount {
    payload: Vec<u8>,
}

impl LinkedAccount {
    pub fn new(user: &SignedInUser) -> Result<Self, CborError> {
        let payload = cbor::to_vec(&LinkedAccountPayload {
            google_account: user.clone(),
        })?;
        Ok(Self { payload })
    }

    pub fn user(&self) -> Result<SignedInUser, CborError> {
        let payload: LinkedAccountPayload = cbor::from_slice(&self.payload)?;
        Ok(payload.google_account)
    }

    /// Find the extension in `certificate`, if present.
    pub fn from_certificate(
        certificate: &Certificate,
    ) -> Result<Option<Self>, LinkedAccountError> {
        let Some(extension) = find_extension(certificate, &LINKED_ACCOUNT_OID) else {
            return Ok(None);
        };
        let payload = OctetString::from_der(extension.extn_value.as_bytes())?.into_bytes();
        Ok(Some(Self { payload }))
    }
}

pub fn find_extension<'a>(
    certificate: &'a Certificate,
    oid: &ObjectIdentifier,
) -> Option<&'a Extension> {
    certificate
        .tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|extension| &extension.extn_id == oid)
}

impl AssociatedOid for LinkedAccount {
    const OID: ObjectIdentifier = LINKED_ACCOUNT_OID;
}

impl FixedTag for LinkedAccount {
    const TAG: Tag = Tag::OctetString;
}

impl EncodeValue for LinkedAccount {
    fn value_len(&self) -> der::Result<Length> {
        Length::try_from(self.payload.len())
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        writer.write(&self.payload)
    }
}

impl AsExtension for LinkedAccount {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        false
    }
}
