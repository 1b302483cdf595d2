//! CBOR helpers shared by the wire payloads.
//!
//! Attestations, assertions and trust-list entries travel inside JSON requests as
//! unpadded base64url strings wrapping a CBOR encoding.

use std::io::Cursor;

use serde::{de, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CborError {
    /// CBOR decoding failure.
    #[error("CBOR decoding failure: {0}")]
    DecodeFailed(String),
    /// CBOR encoding failure.
    #[error("CBOR encoding failure: {0}")]
    EncodeFailed(String),
    /// The text wrapper was not valid base64url.
    #[error("invalid base64url encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

pub fn to_vec<T>(value: &T) -> Result<Vec<u8>, CborError>
where
    T: Serialize,
{
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CborError::EncodeFailed(e.to_string()))?;
    Ok(buf)
}

pub fn from_slice<T>(slice: &[u8]) -> Result<T, CborError>
where
    T: de::DeserializeOwned,
{
    ciborium::from_reader(Cursor::new(&slice)).map_err(|e| CborError::DecodeFailed(e.to_string()))
}

pub fn to_base64url<T>(value: &T) -> Result<String, CborError>
where
    T: Serialize,
{
    Ok(base64::encode_config(to_vec(value)?, base64::URL_SAFE_NO_PAD))
}

pub fn from_base64url<T>(encoded: &str) -> Result<T, CborError>
where
    T: de::DeserializeOwned,
{
    let bytes = base64::decode_config(encoded, base64::URL_SAFE_NO_PAD)?;
    from_slice(&bytes)
}
