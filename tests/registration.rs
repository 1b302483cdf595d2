use mdoc_reader_backend::{
    attestation::DeviceAttestation,
    backend::{ErrorClass, Status},
    trust_list::TrustList,
};
use serde_json::json;

mod common;

use common::{chains, env, env_with, nonce, p256_jwk, register, FakeValidator, TestDevice};

#[test_log::test(tokio::test)]
async fn registered_android_device_certifies_under_trusted_root() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;

    let response = client
        .call("certifyKeys", json!({ "keys": [p256_jwk()] }))
        .await
        .unwrap();
    let chains = chains(&response);
    assert_eq!(chains.len(), 1);
    assert_eq!(
        chains[0].root_entity_certificate(),
        env.trusted_root.chain().end_entity_certificate()
    );
}

#[test_log::test(tokio::test)]
async fn attestation_over_wrong_challenge_registers_untrusted() {
    let env = env();
    let device = TestDevice::android();
    let nonce = nonce(&env.backend).await;
    let response = env
        .backend
        .dispatch(
            "register",
            json!({ "nonce": nonce, "deviceAttestation": device.attestation(b"stale challenge") }),
        )
        .await
        .unwrap();
    assert_eq!(response.status, Status::Ok);

    let client = common::TestClient {
        backend: &env.backend,
        registration_id: response.body["registrationId"]
            .as_str()
            .unwrap()
            .to_string(),
        device,
    };
    let response = client
        .call("certifyKeys", json!({ "keys": [p256_jwk()] }))
        .await
        .unwrap();
    assert_eq!(
        chains(&response)[0].root_entity_certificate(),
        env.untrusted_root.chain().end_entity_certificate()
    );
}

#[test_log::test(tokio::test)]
async fn valid_attestation_from_untrusted_platform_is_untrusted() {
    let env = env();
    let client = register(&env.backend, TestDevice::ios()).await;

    let response = client
        .call("certifyKeys", json!({ "keys": [p256_jwk()] }))
        .await
        .unwrap();
    assert_eq!(
        chains(&response)[0].root_entity_certificate(),
        env.untrusted_root.chain().end_entity_certificate()
    );
}

#[test_log::test(tokio::test)]
async fn unavailable_validator_fails_registration() {
    let env = env_with(FakeValidator { unavailable: true }, TrustList::default());
    let device = TestDevice::android();
    let nonce = nonce(&env.backend).await;

    let error = env
        .backend
        .dispatch(
            "register",
            json!({ "nonce": nonce, "deviceAttestation": device.attestation(&[]) }),
        )
        .await
        .unwrap_err();
    assert_eq!(error.class(), ErrorClass::Infrastructure);
}

#[test_log::test(tokio::test)]
async fn registration_needs_an_issued_nonce() {
    let env = env();
    let device = TestDevice::android();
    let forged = base64::encode_config([0u8; 16], base64::URL_SAFE_NO_PAD);

    let response = env
        .backend
        .dispatch(
            "register",
            json!({ "nonce": forged, "deviceAttestation": device.attestation(&[0u8; 16]) }),
        )
        .await
        .unwrap();
    assert_eq!(response.status, Status::BadRequest);
}

#[test_log::test(tokio::test)]
async fn malformed_registration_is_a_bad_request() {
    let env = env();

    let nonce = nonce(&env.backend).await;
    let response = env
        .backend
        .dispatch(
            "register",
            json!({ "nonce": nonce, "deviceAttestation": "%%%" }),
        )
        .await
        .unwrap();
    assert_eq!(response.status, Status::BadRequest);

    let response = env
        .backend
        .dispatch("register", json!({ "deviceAttestation": "" }))
        .await
        .unwrap();
    assert_eq!(response.status, Status::BadRequest);

    let response = env
        .backend
        .dispatch("unregister", json!({}))
        .await
        .unwrap();
    assert_eq!(response.status, Status::BadRequest);
}

#[test_log::test(tokio::test)]
async fn jwt_attestation_registers_untrusted() {
    let env = env();
    let nonce = nonce(&env.backend).await;
    let attestation = DeviceAttestation::JsonWebToken {
        jwt: "eyJhbGciOiJub25lIn0.e30.".into(),
    };

    let response = env
        .backend
        .dispatch(
            "register",
            json!({ "nonce": nonce, "deviceAttestation": attestation.to_base64url().unwrap() }),
        )
        .await
        .unwrap();
    assert_eq!(response.status, Status::Ok);
    assert!(response.body["registrationId"].is_string());
}
