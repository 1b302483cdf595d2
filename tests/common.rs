use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use serde_bytes::ByteBuf;
use serde_json::{json, Value};
use time::Duration;
use x509_cert::name::Name;

use mdoc_reader_backend::{
    attestation::{
        Assertion, AttestationError, AttestationPolicy, DeviceAssertion, DeviceAttestation,
        DeviceAttestationValidator,
    },
    backend::{Error, ReaderBackendSettings, Response, Status},
    cbor,
    certifier::{KeyCertifier, ReaderRoot, DEFAULT_CERTIFICATE_VALIDITY},
    google::{GoogleIdTokenClaims, GoogleIdTokenVerifier, IdTokenError},
    identity::{ConfiguredReaderIdentities, ReaderIdentity},
    storage::MemoryStorage,
    trust_list::TrustList,
    x509::{root::self_signed_root, X5Chain},
    ReaderBackend,
};

#[allow(dead_code)]
fn main() {}

pub type TestBackend =
    ReaderBackend<MemoryStorage, FakeValidator, FakeGoogle, ConfiguredReaderIdentities>;

pub const ACME_IDENTITY: &str = "acme";

/// Validator standing in for platform attestation checks.
///
/// An Android attestation "chain" is `[SEC1 public key, challenge]`, an iOS blob is the
/// SEC1 public key alone. Assertions are ECDSA P-256 signatures over `assertion_data`.
#[derive(Default)]
pub struct FakeValidator {
    pub unavailable: bool,
}

fn attested_key(attestation: &DeviceAttestation) -> Result<VerifyingKey, AttestationError> {
    let sec1 = match attestation {
        DeviceAttestation::Android { certificate_chain } => certificate_chain
            .first()
            .map(|key| key.as_slice())
            .ok_or_else(|| AttestationError::Malformed("empty chain".into()))?,
        DeviceAttestation::Ios { blob } => blob.as_slice(),
        DeviceAttestation::JsonWebToken { .. } => {
            return Err(AttestationError::Rejected("JWT attestations unsupported".into()))
        }
    };
    VerifyingKey::from_sec1_bytes(sec1).map_err(|e| AttestationError::Malformed(e.to_string()))
}

#[async_trait]
impl DeviceAttestationValidator for FakeValidator {
    async fn validate(
        &self,
        attestation: &DeviceAttestation,
        challenge: &[u8],
        _policy: &AttestationPolicy,
    ) -> Result<(), AttestationError> {
        if self.unavailable {
            return Err(AttestationError::Unavailable("attestation roots offline".into()));
        }
        attested_key(attestation)?;
        if let DeviceAttestation::Android { certificate_chain } = attestation {
            if certificate_chain.get(1).map(|c| c.as_slice()) != Some(challenge) {
                return Err(AttestationError::Rejected("challenge mismatch".into()));
            }
        }
        Ok(())
    }

    async fn validate_assertion(
        &self,
        attestation: &DeviceAttestation,
        assertion: &DeviceAssertion,
    ) -> Result<(), AttestationError> {
        let key = attested_key(attestation)?;
        let signature = Signature::from_slice(&assertion.platform_assertion)
            .map_err(|e| AttestationError::Malformed(e.to_string()))?;
        key.verify(&assertion.assertion_data, &signature)
            .map_err(|_| AttestationError::Rejected("bad assertion signature".into()))
    }
}

/// ID token verifier accepting JSON claims as the token. `"unavailable"` simulates an
/// outage.
pub struct FakeGoogle;

#[async_trait]
impl GoogleIdTokenVerifier for FakeGoogle {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdTokenClaims, IdTokenError> {
        if id_token == "unavailable" {
            return Err(IdTokenError::Unavailable("certs endpoint down".into()));
        }
        serde_json::from_str(id_token).map_err(|e| IdTokenError::Invalid(e.to_string()))
    }
}

#[allow(dead_code)]
pub fn id_token(email: &str, nonce: &str) -> String {
    json!({
        "sub": format!("sub-{email}"),
        "email": email,
        "name": "Test Reader",
        "nonce": nonce,
    })
    .to_string()
}

pub fn reader_root(name: &str) -> Arc<ReaderRoot> {
    let key = SigningKey::random(&mut rand::thread_rng());
    let certificate = self_signed_root(
        &key,
        Name::from_str(&format!("CN={name}")).unwrap(),
        Duration::days(365),
    )
    .unwrap();
    let chain = X5Chain::builder()
        .with_certificate(certificate)
        .unwrap()
        .build()
        .unwrap();
    Arc::new(ReaderRoot::new(key, chain).unwrap())
}

pub struct TestEnv {
    pub backend: TestBackend,
    pub trusted_root: Arc<ReaderRoot>,
    pub untrusted_root: Arc<ReaderRoot>,
    pub acme_root: Arc<ReaderRoot>,
}

#[allow(dead_code)]
pub fn env() -> TestEnv {
    env_with(FakeValidator::default(), TrustList::default())
}

pub fn env_with(validator: FakeValidator, trust_list: TrustList) -> TestEnv {
    let trusted_root = reader_root("Trusted Reader Root");
    let untrusted_root = reader_root("Untrusted Reader Root");
    let acme_root = reader_root("ACME Reader Root");

    let certifier = KeyCertifier::new(
        trusted_root.clone(),
        untrusted_root.clone(),
        DEFAULT_CERTIFICATE_VALIDITY,
    )
    .unwrap();
    let mut settings = ReaderBackendSettings::new(certifier);
    settings.trust_list = trust_list;

    let identities = ConfiguredReaderIdentities::new().with_identity(
        ReaderIdentity {
            id: ACME_IDENTITY.into(),
            display_name: "ACME Security".into(),
            display_icon: None,
            root: acme_root.clone(),
        },
        &["@acme.example".to_string()],
    );

    TestEnv {
        backend: ReaderBackend::new(
            Arc::new(MemoryStorage::new()),
            settings,
            validator,
            FakeGoogle,
            identities,
        ),
        trusted_root,
        untrusted_root,
        acme_root,
    }
}

/// A simulated app installation with its attested key.
pub struct TestDevice {
    key: SigningKey,
    android: bool,
}

impl TestDevice {
    pub fn android() -> Self {
        Self {
            key: SigningKey::random(&mut rand::thread_rng()),
            android: true,
        }
    }

    #[allow(dead_code)]
    pub fn ios() -> Self {
        Self {
            android: false,
            ..Self::android()
        }
    }

    pub fn attestation(&self, challenge: &[u8]) -> String {
        let public_key = self
            .key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        let attestation = if self.android {
            DeviceAttestation::Android {
                certificate_chain: vec![ByteBuf::from(public_key), ByteBuf::from(challenge)],
            }
        } else {
            DeviceAttestation::Ios { blob: public_key }
        };
        attestation.to_base64url().unwrap()
    }

    pub fn assert_nonce(&self, nonce: &str) -> String {
        let raw = base64::decode_config(nonce, base64::URL_SAFE_NO_PAD).unwrap();
        self.assert(&Assertion::Nonce { nonce: raw })
    }

    pub fn assert(&self, assertion: &Assertion) -> String {
        let assertion_data = cbor::to_vec(assertion).unwrap();
        let signature: Signature = self.key.sign(&assertion_data);
        DeviceAssertion {
            assertion_data,
            platform_assertion: signature.to_bytes().to_vec(),
        }
        .to_base64url()
        .unwrap()
    }
}

/// A registered installation talking to a backend through `dispatch`.
pub struct TestClient<'a> {
    pub backend: &'a TestBackend,
    pub device: TestDevice,
    pub registration_id: String,
}

pub async fn nonce(backend: &TestBackend) -> String {
    let response = backend.dispatch("getNonce", json!({})).await.unwrap();
    assert_eq!(response.status, Status::Ok);
    response.body["nonce"].as_str().unwrap().to_string()
}

pub async fn register(backend: &TestBackend, device: TestDevice) -> TestClient<'_> {
    let nonce = nonce(backend).await;
    let raw = base64::decode_config(&nonce, base64::URL_SAFE_NO_PAD).unwrap();
    let response = backend
        .dispatch(
            "register",
            json!({ "nonce": nonce, "deviceAttestation": device.attestation(&raw) }),
        )
        .await
        .unwrap();
    assert_eq!(response.status, Status::Ok);
    TestClient {
        backend,
        registration_id: response.body["registrationId"]
            .as_str()
            .unwrap()
            .to_string(),
        device,
    }
}

impl TestClient<'_> {
    /// Authenticated call; `body` receives the fresh nonce and returns the extra fields.
    pub async fn call_with(
        &self,
        command: &str,
        body: impl FnOnce(&str) -> Value,
    ) -> Result<Response, Error> {
        let nonce = nonce(self.backend).await;
        let mut request = json!({
            "registrationId": self.registration_id,
            "nonce": nonce,
            "deviceAssertion": self.device.assert_nonce(&nonce),
        });
        if let Value::Object(extra) = body(&nonce) {
            request.as_object_mut().unwrap().extend(extra);
        }
        self.backend.dispatch(command, request).await
    }

    pub async fn call(&self, command: &str, extra: Value) -> Result<Response, Error> {
        self.call_with(command, |_| extra).await
    }

    #[allow(dead_code)]
    pub async fn sign_in(&self, email: &str) -> Response {
        self.call_with("signIn", |nonce| {
            json!({ "googleIdTokenString": id_token(email, nonce) })
        })
        .await
        .unwrap()
    }
}

/// JWK of a fresh P-256 key.
#[allow(dead_code)]
pub fn p256_jwk() -> Value {
    let key = p256::SecretKey::random(&mut rand::thread_rng()).public_key();
    serde_json::to_value(key.to_jwk()).unwrap()
}

#[allow(dead_code)]
pub fn p384_jwk() -> Value {
    let key = p384::SecretKey::random(&mut rand::thread_rng()).public_key();
    serde_json::to_value(key.to_jwk()).unwrap()
}

/// Parse the x5c chains of a `certifyKeys` response.
#[allow(dead_code)]
pub fn chains(response: &Response) -> Vec<X5Chain> {
    assert_eq!(response.status, Status::Ok);
    response.body["readerCertifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|x5c| {
            let x5c: Vec<String> = serde_json::from_value(x5c.clone()).unwrap();
            X5Chain::from_x5c(&x5c).unwrap()
        })
        .collect()
}
