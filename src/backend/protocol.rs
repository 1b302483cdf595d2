//! JSON command protocol spoken by reader apps.
//!
//! A request is a command name plus a camelCase JSON body. Recoverable failures are
//! answered with a [`Response`] carrying an error status; integrity and
//! infrastructure failures are returned as `Err` so the transport can fail the call.

use elliptic_curve::JwkEcKey;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ClientAuth, Error, ReaderBackend, Status};
use crate::{
    attestation::DeviceAttestationValidator,
    google::GoogleIdTokenVerifier,
    identity::{ReaderIdentityInfo, ReaderIdentityProvider},
    storage::Storage,
};

pub const GET_NONCE: &str = "getNonce";
pub const REGISTER: &str = "register";
pub const CERTIFY_KEYS: &str = "certifyKeys";
pub const GET_ISSUER_LIST: &str = "getIssuerList";
pub const SIGN_IN: &str = "signIn";
pub const SIGN_OUT: &str = "signOut";
pub const GET_READER_IDENTITIES: &str = "getReaderIdentities";
pub const SELECT_READER_IDENTITY: &str = "selectReaderIdentity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub nonce: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub nonce: String,
    pub device_attestation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub registration_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertifyKeysRequest {
    #[serde(flatten)]
    pub auth: ClientAuth,
    pub keys: Vec<JwkEcKey>,
    #[serde(default)]
    pub reader_identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertifyKeysResponse {
    /// One x5c array per requested key.
    pub reader_certifications: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetIssuerListRequest {
    #[serde(flatten)]
    pub auth: ClientAuth,
    #[serde(default)]
    pub current_version: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    #[serde(flatten)]
    pub auth: ClientAuth,
    pub google_id_token_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderIdentitiesResponse {
    pub entries: Vec<ReaderIdentityInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectReaderIdentityRequest {
    #[serde(flatten)]
    pub auth: ClientAuth,
    #[serde(default)]
    pub reader_identity: Option<String>,
}

/// Answer to a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: Status,
    pub body: Value,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self {
            status: Status::Ok,
            body,
        }
    }
}

fn parse<T: DeserializeOwned>(body: Value) -> Result<T, Error> {
    serde_json::from_value(body).map_err(|e| Error::InvalidRequest(e.to_string()))
}

fn encode<T: Serialize>(body: T) -> Result<Value, Error> {
    serde_json::to_value(body).map_err(|e| Error::Encode(e.to_string()))
}

impl<S, V, G, P> ReaderBackend<S, V, G, P>
where
    S: Storage,
    V: DeviceAttestationValidator,
    G: GoogleIdTokenVerifier,
    P: ReaderIdentityProvider,
{
    /// Run `command` with its JSON `body`.
    pub async fn dispatch(&self, command: &str, body: Value) -> Result<Response, Error> {
        debug!("dispatching {command}");
        match self.handle(command, body).await {
            Ok(body) => Ok(Response::ok(body)),
            Err(e) => match e.status() {
                Some(status) => {
                    warn!("{command} rejected with {}: {e}", status.code());
                    Ok(Response {
                        status,
                        body: json!({ "error": e.to_string() }),
                    })
                }
                None => {
                    warn!("{command} failed: {e}");
                    Err(e)
                }
            },
        }
    }

    async fn handle(&self, command: &str, body: Value) -> Result<Value, Error> {
        match command {
            GET_NONCE => encode(NonceResponse {
                nonce: self.get_nonce().await?,
            }),
            REGISTER => {
                let request: RegisterRequest = parse(body)?;
                let registration_id = self
                    .register(&request.nonce, &request.device_attestation)
                    .await?;
                encode(RegisterResponse { registration_id })
            }
            CERTIFY_KEYS => {
                let request: CertifyKeysRequest = parse(body)?;
                let reader_certifications = self
                    .certify_keys(
                        &request.auth,
                        &request.keys,
                        request.reader_identity.as_deref(),
                    )
                    .await?;
                encode(CertifyKeysResponse {
                    reader_certifications,
                })
            }
            GET_ISSUER_LIST => {
                let request: GetIssuerListRequest = parse(body)?;
                encode(
                    self.get_issuer_list(&request.auth, request.current_version)
                        .await?,
                )
            }
            SIGN_IN => {
                let request: SignInRequest = parse(body)?;
                self.sign_in(&request.auth, &request.google_id_token_string)
                    .await?;
                Ok(json!({}))
            }
            SIGN_OUT => {
                let auth: ClientAuth = parse(body)?;
                self.sign_out(&auth).await?;
                Ok(json!({}))
            }
            GET_READER_IDENTITIES => {
                let auth: ClientAuth = parse(body)?;
                encode(ReaderIdentitiesResponse {
                    entries: self.get_reader_identities(&auth).await?,
                })
            }
            SELECT_READER_IDENTITY => {
                let request: SelectReaderIdentityRequest = parse(body)?;
                self.select_reader_identity(&request.auth, request.reader_identity.as_deref())
                    .await?;
                Ok(json!({}))
            }
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}
