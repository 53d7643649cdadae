// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! End-to-end VC verification scenarios (S5): a credential carrying a
//! `status.status_list` reference is checked against a fetched,
//! signature-verified status list, and revocation is reported as
//! [`sd_jwt_vc::Error::Revoked`] rather than folded into signature failure.

mod support;

use rand::SeedableRng;
use sd_jwt_vc::DisclosureStructure;
use sd_jwt_vc::Error;
use sd_jwt_vc::IssuanceConfig;
use sd_jwt_vc::Issuer;
use sd_jwt_vc::StatusListEngine;
use sd_jwt_vc::VcVerifier;
use sd_jwt_vc::VerificationConfig;
use serde_json::json;
use support::FakeStatusListTransport;
use support::FixedSigner;
use support::OpaqueKeyProvider;

async fn issue_vc_with_status(idx: u64) -> String {
  let claims: sd_jwt_vc::JsonObject = serde_json::from_value(json!({
    "iss": "https://issuer.example.com",
    "iat": 1_683_000_000,
    "vct": "https://credentials.example.com/identity",
    "status": { "status_list": { "uri": "https://issuer.example.com/status/1", "idx": idx } },
  }))
  .unwrap();

  let config = IssuanceConfig::new(DisclosureStructure::new());
  let signer = FixedSigner::new("ES256", vec![8, 8, 8]);
  let issuer = Issuer::new(&signer).with_typ("vc+sd-jwt");
  let mut rng = rand::rngs::StdRng::seed_from_u64(8);
  issuer.issue(claims, &config, None, &mut rng).await.unwrap().compact()
}

#[tokio::test]
async fn revoked_bit_set_is_reported_as_revoked() {
  // S5: bit 42 is set.
  let mut bits = vec![0u8; 8];
  bits[5] = 0b0000_0100; // bit 42 == byte 5, position 2 (42 % 8 == 2)

  let presentation = issue_vc_with_status(42).await;

  let key_provider = OpaqueKeyProvider;
  let jws_verifier = support::FixedVerifier::new(vec![8, 8, 8]);
  let transport = FakeStatusListTransport::new(&bits, "ES256", vec![8, 8, 8]);
  let config = VerificationConfig::default();
  let status_list = StatusListEngine::new(&key_provider, &jws_verifier, &transport, &config);
  let verifier = VcVerifier::new(&key_provider, &jws_verifier, config, Some(&status_list));

  let err = verifier.verify_vc(&presentation).await.unwrap_err();
  assert!(matches!(err, Error::Revoked));
  assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn unset_bit_verifies_successfully() {
  // S5 variant: idx 10 points at an unset bit, so verification succeeds.
  let mut bits = vec![0u8; 8];
  bits[5] = 0b0000_0100;

  let presentation = issue_vc_with_status(10).await;

  let key_provider = OpaqueKeyProvider;
  let jws_verifier = support::FixedVerifier::new(vec![8, 8, 8]);
  let transport = FakeStatusListTransport::new(&bits, "ES256", vec![8, 8, 8]);
  let config = VerificationConfig::default();
  let status_list = StatusListEngine::new(&key_provider, &jws_verifier, &transport, &config);
  let verifier = VcVerifier::new(&key_provider, &jws_verifier, config, Some(&status_list));

  let result = verifier.verify_vc(&presentation).await.unwrap();
  assert_eq!(result.vc.vct.as_deref(), Some("https://credentials.example.com/identity"));
}

#[tokio::test]
async fn status_list_is_cached_across_verifications() {
  let bits = vec![0u8; 8];
  let transport = FakeStatusListTransport::new(&bits, "ES256", vec![8, 8, 8]);
  let key_provider = OpaqueKeyProvider;
  let jws_verifier = support::FixedVerifier::new(vec![8, 8, 8]);
  let config = VerificationConfig::default();
  let status_list = StatusListEngine::new(&key_provider, &jws_verifier, &transport, &config);
  let verifier = VcVerifier::new(&key_provider, &jws_verifier, config, Some(&status_list));

  let first = issue_vc_with_status(0).await;
  let second = issue_vc_with_status(1).await;
  verifier.verify_vc(&first).await.unwrap();
  verifier.verify_vc(&second).await.unwrap();

  assert_eq!(transport.call_count(), 1);
}
