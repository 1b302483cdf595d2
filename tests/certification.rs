use std::time::SystemTime;

use mdoc_reader_backend::{
    backend::Status,
    certifier::{DEFAULT_WITH_ACCOUNT_DETAILS, MAX_KEYS_PER_BATCH},
    x509::{extensions::LinkedAccount, signature::verify_issued_by, X5Chain},
};
use serde_json::json;

mod common;

use common::{chains, env, p256_jwk, p384_jwk, register, TestDevice, ACME_IDENTITY};

fn assert_valid_now(chain: &X5Chain) {
    let now = SystemTime::now();
    let certificates: Vec<_> = chain.iter().map(|c| &c.inner).collect();
    for pair in certificates.windows(2) {
        verify_issued_by(pair[0], pair[1]).unwrap();
    }
    for certificate in certificates {
        let validity = &certificate.tbs_certificate.validity;
        assert!(validity.not_before.to_system_time() <= now);
        assert!(validity.not_after.to_system_time() > now);
    }
}

#[test_log::test(tokio::test)]
async fn every_key_gets_its_own_valid_chain() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;
    let keys = vec![p256_jwk(), p384_jwk(), p256_jwk(), p256_jwk(), p384_jwk()];

    let response = client
        .call("certifyKeys", json!({ "keys": keys }))
        .await
        .unwrap();
    let certified = chains(&response);
    assert_eq!(certified.len(), 5);

    for chain in &certified {
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.end_entity_common_name(), "mdoc reader key");
        assert_valid_now(chain);
        assert!(LinkedAccount::from_certificate(chain.end_entity_certificate())
            .unwrap()
            .is_none());
    }

    let validities: Vec<_> = certified
        .iter()
        .map(|chain| &chain.end_entity_certificate().tbs_certificate.validity)
        .collect();
    for (i, validity) in validities.iter().enumerate() {
        assert!(!validities[i + 1..].contains(validity));
    }
}

#[test_log::test(tokio::test)]
async fn unsupported_key_fails_the_whole_batch() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;
    let unsupported = json!({ "kty": "EC", "crv": "P-521", "x": "AA", "y": "AA" });

    let response = client
        .call("certifyKeys", json!({ "keys": [p256_jwk(), unsupported] }))
        .await
        .unwrap();
    assert_eq!(response.status, Status::BadRequest);
    assert!(response.body.get("readerCertifications").is_none());
}

#[test_log::test(tokio::test)]
async fn oversized_batch_is_a_bad_request() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;
    let keys = vec![p256_jwk(); MAX_KEYS_PER_BATCH + 1];

    let response = client
        .call("certifyKeys", json!({ "keys": keys }))
        .await
        .unwrap();
    assert_eq!(response.status, Status::BadRequest);
}

#[test_log::test(tokio::test)]
async fn reader_identity_requires_sign_in() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;

    for identity in [ACME_IDENTITY, DEFAULT_WITH_ACCOUNT_DETAILS] {
        let response = client
            .call(
                "certifyKeys",
                json!({ "keys": [p256_jwk()], "readerIdentity": identity }),
            )
            .await
            .unwrap();
        assert_eq!(response.status, Status::Forbidden);
    }
}

#[test_log::test(tokio::test)]
async fn account_details_are_embedded_on_request() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;
    assert_eq!(client.sign_in("reader@example.com").await.status, Status::Ok);

    let response = client
        .call(
            "certifyKeys",
            json!({ "keys": [p256_jwk()], "readerIdentity": DEFAULT_WITH_ACCOUNT_DETAILS }),
        )
        .await
        .unwrap();
    let certified = chains(&response);
    assert_eq!(
        certified[0].root_entity_certificate(),
        env.trusted_root.chain().end_entity_certificate()
    );
    let linked = LinkedAccount::from_certificate(certified[0].end_entity_certificate())
        .unwrap()
        .unwrap();
    let user = linked.user().unwrap();
    assert_eq!(user.email.as_deref(), Some("reader@example.com"));
    assert_eq!(user.id, "sub-reader@example.com");

    let response = client
        .call("certifyKeys", json!({ "keys": [p256_jwk()] }))
        .await
        .unwrap();
    let certified = chains(&response);
    assert!(LinkedAccount::from_certificate(certified[0].end_entity_certificate())
        .unwrap()
        .is_none());
}

#[test_log::test(tokio::test)]
async fn permitted_identity_signs_with_its_own_root() {
    let env = env();
    let client = register(&env.backend, TestDevice::ios()).await;
    client.sign_in("guard@acme.example").await;

    let response = client
        .call(
            "certifyKeys",
            json!({ "keys": [p256_jwk()], "readerIdentity": ACME_IDENTITY }),
        )
        .await
        .unwrap();
    let certified = chains(&response);
    let chain = &certified[0];
    assert_eq!(
        chain.root_entity_certificate(),
        env.acme_root.chain().end_entity_certificate()
    );
    assert_valid_now(chain);
}

#[test_log::test(tokio::test)]
async fn identity_of_another_organisation_is_forbidden() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;
    client.sign_in("someone@example.com").await;

    for command in ["certifyKeys", "selectReaderIdentity"] {
        let response = client
            .call(
                command,
                json!({ "keys": [p256_jwk()], "readerIdentity": ACME_IDENTITY }),
            )
            .await
            .unwrap();
        assert_eq!(response.status, Status::Forbidden, "{command}");
    }
}

#[test_log::test(tokio::test)]
async fn selected_identity_is_used_until_sign_out() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;
    client.sign_in("guard@acme.example").await;

    let response = client
        .call(
            "selectReaderIdentity",
            json!({ "readerIdentity": ACME_IDENTITY }),
        )
        .await
        .unwrap();
    assert_eq!(response.status, Status::Ok);

    let response = client
        .call("certifyKeys", json!({ "keys": [p256_jwk()] }))
        .await
        .unwrap();
    assert_eq!(
        chains(&response)[0].root_entity_certificate(),
        env.acme_root.chain().end_entity_certificate()
    );

    let response = client.call("signOut", json!({})).await.unwrap();
    assert_eq!(response.status, Status::Ok);

    let response = client
        .call("certifyKeys", json!({ "keys": [p256_jwk()] }))
        .await
        .unwrap();
    assert_eq!(
        chains(&response)[0].root_entity_certificate(),
        env.trusted_root.chain().end_entity_certificate()
    );
}

#[test_log::test(tokio::test)]
async fn selection_can_be_cleared() {
    let env = env();
    let client = register(&env.backend, TestDevice::android()).await;
    client.sign_in("guard@acme.example").await;

    client
        .call(
            "selectReaderIdentity",
            json!({ "readerIdentity": ACME_IDENTITY }),
        )
        .await
        .unwrap();
    let response = client
        .call("selectReaderIdentity", json!({}))
        .await
        .unwrap();
    assert_eq!(response.status, Status::Ok);

    let response = client
        .call("certifyKeys", json!({ "keys": [p256_jwk()] }))
        .await
        .unwrap();
    assert_eq!(
        chains(&response)[0].root_entity_certificate(),
        env.trusted_root.chain().end_entity_certificate()
    );
}
