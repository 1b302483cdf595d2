use mdoc_reader_backend::{
    backend::{ErrorClass, Status},
    identity::ReaderIdentityInfo,
};
use serde_json::json;

mod common;

use common::{env, id_token, register, TestDevice, ACME_IDENTITY};

#[test_log::test(tokio::test)]
async fn second_sign_in_conflicts_until_sign_out() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;

    assert_eq!(client.sign_in("reader@example.com").await.status, Status::Ok);
    assert_eq!(
        client.sign_in("reader@example.com").await.status,
        Status::Conflict
    );

    let response = client.call("signOut", json!({})).await.unwrap();
    assert_eq!(response.status, Status::Ok);
    assert_eq!(client.sign_in("other@example.com").await.status, Status::Ok);
}

#[test_log::test(tokio::test)]
async fn sign_out_without_sign_in_conflicts() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;

    let response = client.call("signOut", json!({})).await.unwrap();
    assert_eq!(response.status, Status::Conflict);
}

#[test_log::test(tokio::test)]
async fn token_for_another_nonce_is_an_integrity_failure() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;
    let earlier_nonce = common::nonce(&env.backend).await;

    let error = client
        .call(
            "signIn",
            json!({ "googleIdTokenString": id_token("reader@example.com", &earlier_nonce) }),
        )
        .await
        .unwrap_err();
    assert_eq!(error.class(), ErrorClass::Integrity);

    // Nothing was persisted.
    assert_eq!(client.sign_in("reader@example.com").await.status, Status::Ok);
}

#[test_log::test(tokio::test)]
async fn token_verifier_failures_are_not_recoverable() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;

    let error = client
        .call("signIn", json!({ "googleIdTokenString": "garbage" }))
        .await
        .unwrap_err();
    assert_eq!(error.class(), ErrorClass::Integrity);

    let error = client
        .call("signIn", json!({ "googleIdTokenString": "unavailable" }))
        .await
        .unwrap_err();
    assert_eq!(error.class(), ErrorClass::Infrastructure);
}

#[test_log::test(tokio::test)]
async fn reader_identities_need_a_signed_in_user() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;

    for command in ["getReaderIdentities", "selectReaderIdentity"] {
        let response = client.call(command, json!({})).await.unwrap();
        assert_eq!(response.status, Status::Conflict, "{command}");
    }
}

#[test_log::test(tokio::test)]
async fn reader_identities_are_listed_per_account() {
    let env = env();
    let acme = register(&env.backend, TestDevice::android()).await;
    acme.sign_in("guard@acme.example").await;
    let other = register(&env.backend, TestDevice::android()).await;
    other.sign_in("someone@example.com").await;

    let response = acme.call("getReaderIdentities", json!({})).await.unwrap();
    assert_eq!(response.status, Status::Ok);
    let entries: Vec<ReaderIdentityInfo> =
        serde_json::from_value(response.body["entries"].clone()).unwrap();
    assert_eq!(
        entries,
        vec![ReaderIdentityInfo {
            id: ACME_IDENTITY.into(),
            display_name: "ACME Security".into(),
            display_icon: None,
        }]
    );
    assert_eq!(
        response.body["entries"][0],
        json!({ "id": ACME_IDENTITY, "displayName": "ACME Security" })
    );

    let response = other.call("getReaderIdentities", json!({})).await.unwrap();
    assert_eq!(response.body, json!({ "entries": [] }));
}
