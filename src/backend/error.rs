use serde::Serialize;

use crate::{
    attestation::AttestationError,
    certifier::CertifyError,
    client::RegistryError,
    google::IdTokenError,
    identity::IdentityError,
    nonce::NonceError,
    storage::StorageError,
};

/// How a failed operation is surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected protocol outcome the client reacts to, reported with a [`Status`].
    Recoverable,
    /// The request failed a proof-of-possession or token check.
    Integrity,
    /// A dependency of the backend failed.
    Infrastructure,
}

/// Status of a protocol response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u16")]
pub enum Status {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::Conflict => 409,
        }
    }
}

impl From<Status> for u16 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown registration id")]
    UnknownRegistration,
    #[error("unknown or expired nonce")]
    UnknownNonce,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("already signed in")]
    AlreadySignedIn,
    #[error("not signed in")]
    NotSignedIn,
    #[error("device assertion rejected: {0}")]
    Assertion(String),
    #[error("Google ID token rejected: {0}")]
    IdToken(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Registry(RegistryError),
    #[error(transparent)]
    Attestation(AttestationError),
    #[error("Google ID token verifier unavailable: {0}")]
    IdTokenVerifier(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Certify(CertifyError),
    #[error("unable to encode response: {0}")]
    Encode(String),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::UnknownRegistration
            | Error::UnknownNonce
            | Error::InvalidRequest(_)
            | Error::UnknownCommand(_)
            | Error::Forbidden(_)
            | Error::AlreadySignedIn
            | Error::NotSignedIn => ErrorClass::Recoverable,
            Error::Assertion(_) | Error::IdToken(_) => ErrorClass::Integrity,
            Error::Storage(_)
            | Error::Registry(_)
            | Error::Attestation(_)
            | Error::IdTokenVerifier(_)
            | Error::Identity(_)
            | Error::Certify(_)
            | Error::Encode(_) => ErrorClass::Infrastructure,
        }
    }

    /// Response status for recoverable errors, `None` for everything else.
    pub fn status(&self) -> Option<Status> {
        let status = match self {
            Error::UnknownRegistration => Status::NotFound,
            Error::UnknownNonce | Error::InvalidRequest(_) | Error::UnknownCommand(_) => {
                Status::BadRequest
            }
            Error::Forbidden(_) => Status::Forbidden,
            Error::AlreadySignedIn | Error::NotSignedIn => Status::Conflict,
            _ => return None,
        };
        Some(status)
    }
}

impl From<NonceError> for Error {
    fn from(value: NonceError) -> Self {
        match value {
            NonceError::UnknownNonce => Error::UnknownNonce,
            NonceError::Storage(e) => Error::Storage(e),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::UnknownRegistration => Error::UnknownRegistration,
            RegistryError::Storage(e) => Error::Storage(e),
            other => Error::Registry(other),
        }
    }
}

impl From<AttestationError> for Error {
    fn from(value: AttestationError) -> Self {
        match value {
            AttestationError::Unavailable(_) => Error::Attestation(value),
            rejected => Error::Assertion(rejected.to_string()),
        }
    }
}

impl From<IdTokenError> for Error {
    fn from(value: IdTokenError) -> Self {
        match value {
            IdTokenError::Invalid(reason) => Error::IdToken(reason),
            IdTokenError::Unavailable(e) => Error::IdTokenVerifier(e),
        }
    }
}

impl From<CertifyError> for Error {
    fn from(value: CertifyError) -> Self {
        match value {
            CertifyError::UnsupportedCurve(_)
            | CertifyError::InvalidKey(_)
            | CertifyError::TooManyKeys(_) => {
                Error::InvalidRequest(value.to_string())
            }
            other => Error::Certify(other),
        }
    }
}
