// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Disclosure-hygiene scenarios: a verifier never leaks more than what was
//! disclosed (Property 2), never accepts the same disclosure twice
//! (Property 5), and never accepts a disclosure claiming a reserved key
//! name (Property 6, S6).

mod support;

use rand::SeedableRng;
use sd_jwt_vc::DisclosureNode;
use sd_jwt_vc::DisclosureStructure;
use sd_jwt_vc::Error;
use sd_jwt_vc::Holder;
use sd_jwt_vc::IssuanceConfig;
use sd_jwt_vc::Issuer;
use sd_jwt_vc::Sha256Hasher;
use sd_jwt_vc::VerificationConfig;
use sd_jwt_vc::Verifier;
use serde_json::json;
use serde_json::Value;
use support::FixedSigner;
use support::FixedVerifier;
use support::OpaqueKeyProvider;

async fn issue_three_field_bundle() -> sd_jwt_vc::IssuanceBundle {
  let claims: sd_jwt_vc::JsonObject = serde_json::from_value(json!({
    "iss": "https://issuer.example.com",
    "iat": 1_683_000_000,
    "given_name": "Erika",
    "family_name": "Mustermann",
    "email": "erika@example.com",
  }))
  .unwrap();

  let mut structure = DisclosureStructure::new();
  structure.insert("given_name".to_string(), DisclosureNode::disclosable());
  structure.insert("family_name".to_string(), DisclosureNode::disclosable());
  structure.insert("email".to_string(), DisclosureNode::disclosable());
  let config = IssuanceConfig::new(structure);

  let signer = FixedSigner::new("ES256", vec![6, 6, 6]);
  let issuer = Issuer::new(&signer);
  let mut rng = rand::rngs::StdRng::seed_from_u64(6);
  issuer.issue(claims, &config, None, &mut rng).await.unwrap()
}

#[tokio::test]
async fn verifier_reveals_only_what_was_disclosed() {
  let bundle = issue_three_field_bundle().await;
  let holder = Holder::from_sd_jwt(bundle.into_sd_jwt());
  let hasher = Sha256Hasher::new();

  // Conceal everything except `given_name`.
  let (presented, removed) = holder
    .create_presentation(&hasher, &["family_name", "email"], None)
    .await
    .unwrap();
  assert_eq!(removed.len(), 2);

  let key_provider = OpaqueKeyProvider;
  let jws_verifier = FixedVerifier::new(vec![6, 6, 6]);
  let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

  let result = verifier.verify(&presented.presentation()).await.unwrap();
  assert_eq!(result.claims.get("given_name").and_then(Value::as_str), Some("Erika"));
  assert!(result.claims.get("family_name").is_none());
  assert!(result.claims.get("email").is_none());
  assert!(result.claims.get("_sd").is_none());
  assert!(result.claims.get("_sd_alg").is_none());
}

#[tokio::test]
async fn duplicated_disclosure_in_presentation_is_rejected() {
  let bundle = issue_three_field_bundle().await;
  let prefix = bundle.sd_jwt().presentation_prefix();
  let first = bundle.disclosures().first().unwrap().to_string();
  // Repeat the same disclosure segment twice.
  let tampered = format!("{prefix}{first}~{first}~");

  let key_provider = OpaqueKeyProvider;
  let jws_verifier = FixedVerifier::new(vec![6, 6, 6]);
  let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

  let err = verifier.verify(&tampered).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateDisclosure { .. }));
}

#[tokio::test]
async fn disclosure_claiming_a_reserved_key_name_is_rejected() {
  let bundle = issue_three_field_bundle().await;
  let jws = bundle.compact().split('~').next().unwrap().to_string();

  // Forge a disclosure whose claim name is the reserved `_sd` key.
  let forged = sd_jwt_vc::b64url_encode(serde_json::to_vec(&json!(["salt-value", "_sd", "whatever"])).unwrap());
  let presentation = format!("{jws}~{forged}~");

  let key_provider = OpaqueKeyProvider;
  let jws_verifier = FixedVerifier::new(vec![6, 6, 6]);
  let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

  let err = verifier.verify(&presentation).await.unwrap_err();
  assert!(matches!(err, Error::ReservedKey(ref name) if name == "_sd"));
}
