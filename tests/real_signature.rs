// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Round-trips an issuance and presentation through real HS256 cryptography
//! via `josekit`, instead of the fixed-byte-string fakes the other
//! integration tests use. This exercises the actual signing-input bytes a
//! [`sd_jwt_vc::JwsSigner`]/[`sd_jwt_vc::JwsVerifier`] pair sees, which the
//! fakes in `support/mod.rs` never touch.

mod support;

use async_trait::async_trait;
use josekit::jws::JwsVerifier as JosekitJwsVerifier;
use josekit::jws::HS256;
use rand::SeedableRng;
use sd_jwt_vc::DisclosureNode;
use sd_jwt_vc::DisclosureStructure;
use sd_jwt_vc::Error;
use sd_jwt_vc::Holder;
use sd_jwt_vc::IssuanceConfig;
use sd_jwt_vc::Issuer;
use sd_jwt_vc::JsonObject;
use sd_jwt_vc::Sha256Hasher;
use sd_jwt_vc::VerificationConfig;
use sd_jwt_vc::Verifier;
use serde_json::json;
use serde_json::Value;
use support::OpaqueKeyProvider;

const SECRET: &[u8] = b"0123456789ABCDEF0123456789ABCDEF";

/// Signs the real `<header_b64>.<payload_b64>` bytes with HS256, the same
/// shape the teacher's own `josekit`-backed test fixtures use.
struct HmacSigner;

#[async_trait]
impl sd_jwt_vc::JwsSigner for HmacSigner {
  fn alg(&self) -> &str {
    "HS256"
  }

  async fn sign(&self, header: &JsonObject, payload: &JsonObject) -> anyhow::Result<Vec<u8>> {
    let header_b64 = sd_jwt_vc::b64url_encode(serde_json::to_vec(header)?);
    let payload_b64 = sd_jwt_vc::b64url_encode(serde_json::to_vec(payload)?);
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signer = HS256.signer_from_bytes(SECRET)?;
    Ok(signer.sign(signing_input.as_bytes())?)
  }
}

/// Verifies over whatever `signing_input` the caller hands in, not a
/// re-derived one — the point of this test is that those two must match.
struct HmacVerifier;

#[async_trait]
impl sd_jwt_vc::JwsVerifier for HmacVerifier {
  async fn verify(&self, _header: &JsonObject, signing_input: &str, signature: &[u8], _key: &JsonObject) -> anyhow::Result<()> {
    let verifier = HS256.verifier_from_bytes(SECRET)?;
    verifier.verify(signing_input.as_bytes(), signature)?;
    Ok(())
  }
}

fn claims() -> JsonObject {
  serde_json::from_value(json!({
    "iss": "https://issuer.example.com",
    "iat": 1_683_000_000,
    "given_name": "Erika",
    "family_name": "Mustermann",
    "email": "erika@example.com",
  }))
  .unwrap()
}

fn config() -> IssuanceConfig {
  let mut structure = DisclosureStructure::new();
  structure.insert("given_name".to_string(), DisclosureNode::disclosable());
  structure.insert("email".to_string(), DisclosureNode::disclosable());
  IssuanceConfig::new(structure)
}

#[tokio::test]
async fn verifies_a_real_hs256_signature_over_the_exact_signing_input() {
  let signer = HmacSigner;
  let issuer = Issuer::new(&signer);
  let mut rng = rand::rngs::StdRng::seed_from_u64(7);
  let bundle = issuer.issue(claims(), &config(), None, &mut rng).await.unwrap();

  let holder = Holder::from_sd_jwt(bundle.into_sd_jwt());
  let hasher = Sha256Hasher::new();
  let (presented, _removed) = holder.create_presentation(&hasher, &[], None).await.unwrap();

  let key_provider = OpaqueKeyProvider;
  let jws_verifier = HmacVerifier;
  let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

  let result = verifier.verify(&presented.presentation()).await.unwrap();
  assert_eq!(result.claims.get("given_name").and_then(Value::as_str), Some("Erika"));
  assert_eq!(result.claims.get("email").and_then(Value::as_str), Some("erika@example.com"));
}

#[tokio::test]
async fn rejects_a_real_hs256_signature_verified_under_the_wrong_key() {
  let signer = HmacSigner;
  let issuer = Issuer::new(&signer);
  let mut rng = rand::rngs::StdRng::seed_from_u64(8);
  let bundle = issuer.issue(claims(), &config(), None, &mut rng).await.unwrap();

  let holder = Holder::from_sd_jwt(bundle.into_sd_jwt());
  let hasher = Sha256Hasher::new();
  let (presented, _removed) = holder.create_presentation(&hasher, &[], None).await.unwrap();

  struct WrongKeyVerifier;
  #[async_trait]
  impl sd_jwt_vc::JwsVerifier for WrongKeyVerifier {
    async fn verify(&self, _header: &JsonObject, signing_input: &str, signature: &[u8], _key: &JsonObject) -> anyhow::Result<()> {
      let verifier = HS256.verifier_from_bytes(b"not-the-issuer-secret-0000000000")?;
      verifier.verify(signing_input.as_bytes(), signature)?;
      Ok(())
    }
  }

  let key_provider = OpaqueKeyProvider;
  let jws_verifier = WrongKeyVerifier;
  let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

  let err = verifier.verify(&presented.presentation()).await.unwrap_err();
  assert!(matches!(err, Error::InvalidSignature(_)));
}
