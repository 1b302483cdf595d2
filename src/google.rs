//! Google account linkage.
//!
//! The reader app obtains a Google ID token whose `nonce` claim is a backend nonce and
//! hands it over in `signIn`. Token signature and audience checks are the verifier's
//! job; this module maps verified claims onto a [`SignedInUser`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::SignedInUser;

/// Claims of a verified Google ID token that the backend uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleIdTokenClaims {
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl GoogleIdTokenClaims {
    /// Whether the token was minted for `nonce`.
    pub fn is_bound_to(&self, nonce: &str) -> bool {
        self.nonce.as_deref() == Some(nonce)
    }
}

impl From<GoogleIdTokenClaims> for SignedInUser {
    fn from(claims: GoogleIdTokenClaims) -> Self {
        SignedInUser {
            id: claims.subject,
            email: claims.email,
            display_name: claims.name,
            profile_picture_uri: claims.picture,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdTokenError {
    /// Bad signature, wrong audience, expired or otherwise unacceptable.
    #[error("invalid Google ID token: {0}")]
    Invalid(String),
    /// Could not fetch signing keys or reach the verification service.
    #[error("Google ID token verifier unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait GoogleIdTokenVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdTokenClaims, IdTokenError>;
}
