// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The verifier (C8): rehydrates a presentation's disclosed claims and
//! checks the issuer signature, digest bindings, disclosure hygiene, and
//! key binding, given injected [`KeyProvider`]/[`JwsVerifier`] collaborators.
//! The VC profile ([`crate::VcVerifier`]) layers issuer trust and revocation
//! checking on top of this.

use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::VerificationConfig;
use crate::key_binding::KB_JWT_HEADER_TYP;
use crate::sd_jwt::SdJwt;
use crate::sd_jwt::SdJwtClaims;
use crate::Error;
use crate::Hasher;
use crate::JsonObject;
use crate::RequiredKeyBinding;
use crate::Result;
use crate::SdObjectDecoder;
use crate::ARRAY_DIGEST_KEY;
use crate::DIGESTS_KEY;
use crate::SD_ALG_KEY;
use crate::SHA_ALG_NAME;

/// A key-resolution collaborator, injected so the core never links a key
/// store or DID resolver. `header` is the JOSE header of the JWT whose
/// signer is being resolved; `payload_hint` is its claims, offered for
/// providers that key off `iss` or similar rather than (or in addition to)
/// the header.
///
/// ## Errors
/// Any error surfaces as [`crate::Error::UnresolvedKey`].
#[async_trait]
pub trait KeyProvider: Send + Sync {
  /// Resolves the public key, returned as a JWK-shaped JSON object.
  async fn resolve(&self, header: &JsonObject, payload_hint: Option<&JsonObject>) -> anyhow::Result<JsonObject>;
}

/// A JWS verification collaborator, injected so the core never links a
/// signature implementation. `signing_input` is `<header_b64>.<payload_b64>`;
/// `key` is whatever [`KeyProvider::resolve`] returned for this header.
#[async_trait]
pub trait JwsVerifier: Send + Sync {
  /// Checks `signature` over `signing_input` under `key`.
  ///
  /// ## Errors
  /// Any error surfaces as [`crate::Error::InvalidSignature`] (or, for a
  /// Key-Binding JWT, [`crate::Error::KeyBindingFailed`]).
  async fn verify(&self, header: &JsonObject, signing_input: &str, signature: &[u8], key: &JsonObject) -> anyhow::Result<()>;
}

/// The outcome of a successful [`Verifier::verify`].
#[derive(Debug, Clone)]
pub struct VerificationResult {
  /// The fully rehydrated claim tree (every disclosure substituted back in).
  pub claims: JsonObject,
  /// Whether a Key-Binding JWT was present and verified. `false` means no
  /// KB-JWT was presented and [`VerificationConfig::require_kb`] was `false`.
  pub kb_verified: bool,
}

/// Verifies SD-JWT presentations against injected signing-key and
/// JWS-verification collaborators.
pub struct Verifier<'a> {
  key_provider: &'a dyn KeyProvider,
  jws_verifier: &'a dyn JwsVerifier,
  config: VerificationConfig,
}

impl<'a> Verifier<'a> {
  /// Builds a verifier bound to `key_provider` and `jws_verifier`, applying
  /// `config` to issuer/lifetime/audience/nonce/key-binding checks.
  pub fn new(key_provider: &'a dyn KeyProvider, jws_verifier: &'a dyn JwsVerifier, config: VerificationConfig) -> Self {
    Self {
      key_provider,
      jws_verifier,
      config,
    }
  }

  /// The configuration this verifier was built with.
  pub fn config(&self) -> &VerificationConfig {
    &self.config
  }

  /// Parses `presentation` and runs it through the full verification
  /// pipeline: signature, disclosure uniqueness, digest mapping, superfluous
  /// disclosures, rehydration, and (if present) key binding.
  pub async fn verify(&self, presentation: &str) -> Result<VerificationResult> {
    let sd_jwt = SdJwt::parse(presentation)?;
    self.verify_parsed(&sd_jwt).await
  }

  /// Like [`Self::verify`], but over an already-parsed [`SdJwt`]. Used by
  /// [`crate::VcVerifier`], which needs the parsed form to inspect `vct` and
  /// `status` before (and regardless of) any trust decision this pipeline
  /// itself would make.
  pub(crate) async fn verify_parsed(&self, sd_jwt: &SdJwt) -> Result<VerificationResult> {
    let header = sd_jwt.header();
    self
      .config
      .allowed_signature_algorithms
      .validate(header.get("alg").and_then(Value::as_str).unwrap_or_default())?;

    let payload = claims_as_object(sd_jwt.claims())?;
    let key = self
      .key_provider
      .resolve(header, Some(&payload))
      .await
      .map_err(|e| Error::UnresolvedKey(e.to_string()))?;

    self.check_issuer(&payload)?;
    self.check_lifetime(&payload)?;

    let signing_input = sd_jwt.signing_input()?;
    self
      .jws_verifier
      .verify(header, &signing_input, sd_jwt.signature(), &key)
      .await
      .map_err(|e| Error::InvalidSignature(e.to_string()))?;

    let mut seen = HashSet::new();
    for (index, disclosure) in sd_jwt.disclosures().iter().enumerate() {
      if !seen.insert(disclosure.as_str()) {
        return Err(Error::DuplicateDisclosure { index });
      }
    }

    let alg_name = sd_jwt.claims()._sd_alg.as_deref().unwrap_or(SHA_ALG_NAME);
    let hasher = crate::hasher_for_alg_name(alg_name)?;

    let mut present_digests = HashSet::new();
    collect_digests(&Value::Object(payload.clone()), &mut present_digests);

    let mut disclosure_map = HashMap::new();
    let mut consumed = HashSet::new();
    for (index, disclosure) in sd_jwt.disclosures().iter().enumerate() {
      let digest = hasher.encoded_digest(disclosure.as_str());
      if !present_digests.contains(&digest) {
        return Err(Error::DigestMismatch { index });
      }
      if !consumed.insert(digest.clone()) {
        return Err(Error::SuperfluousDisclosure { index });
      }
      disclosure_map.insert(digest, disclosure.clone());
    }

    let decoder = SdObjectDecoder::new();
    let mut rehydrated = HashSet::new();
    let claims = decoder.decode_with_consumption(&payload, &disclosure_map, &mut rehydrated);

    let kb_verified = self.verify_key_binding(sd_jwt, hasher.as_ref()).await?;

    Ok(VerificationResult { claims, kb_verified })
  }

  fn check_issuer(&self, payload: &JsonObject) -> Result<()> {
    let Some(expected) = &self.config.trusted_issuer else {
      return Ok(());
    };
    let actual = payload.get("iss").and_then(Value::as_str);
    if actual != Some(expected.as_str()) {
      return Err(Error::InvalidSignature(format!(
        "issuer {actual:?} does not match trusted issuer \"{expected}\""
      )));
    }
    Ok(())
  }

  fn check_lifetime(&self, payload: &JsonObject) -> Result<()> {
    let now = now_unix();
    let skew = self.config.clock_skew.as_secs() as i64;
    if let Some(nbf) = payload.get("nbf").and_then(Value::as_i64) {
      if now + skew < nbf {
        return Err(Error::InvalidSignature("token is not yet valid (nbf)".to_string()));
      }
    }
    if let Some(exp) = payload.get("exp").and_then(Value::as_i64) {
      if now - skew > exp {
        return Err(Error::InvalidSignature("token has expired (exp)".to_string()));
      }
    }
    if let Some(iat) = payload.get("iat").and_then(Value::as_i64) {
      if now + skew < iat {
        return Err(Error::InvalidSignature("token was issued in the future (iat)".to_string()));
      }
    }
    Ok(())
  }

  async fn verify_key_binding(&self, sd_jwt: &SdJwt, hasher: &dyn Hasher) -> Result<bool> {
    let Some(kb) = sd_jwt.key_binding_jwt() else {
      return if self.config.require_kb {
        Err(Error::MissingKeyBindingJwt)
      } else {
        Ok(false)
      };
    };

    if kb.header().get("typ").and_then(Value::as_str) != Some(KB_JWT_HEADER_TYP) {
      return Err(Error::KeyBindingFailed(format!("header typ must be \"{KB_JWT_HEADER_TYP}\"")));
    }

    let key = match sd_jwt.required_key_bind() {
      Some(RequiredKeyBinding::Jwk(jwk)) => jwk.clone(),
      Some(RequiredKeyBinding::Kid(kid)) => {
        let mut header = JsonObject::new();
        header.insert("kid".to_string(), Value::String(kid.clone()));
        self
          .key_provider
          .resolve(&header, None)
          .await
          .map_err(|e| Error::UnresolvedKey(e.to_string()))?
      }
      None => {
        return Err(Error::KeyBindingFailed(
          "presentation carries a key-binding JWT but the issuance bound no confirmation key".to_string(),
        ))
      }
    };

    let signing_input = kb.signing_input()?;
    self
      .jws_verifier
      .verify(kb.header(), &signing_input, kb.signature(), &key)
      .await
      .map_err(|e| Error::KeyBindingFailed(e.to_string()))?;

    // `sd_hash` binds the KB-JWT to exactly this presentation's disclosures;
    // comparison must not leak timing information about where they diverge.
    let expected_sd_hash = hasher.encoded_digest(&sd_jwt.presentation_prefix());
    if !constant_time_eq(&expected_sd_hash, &kb.claims().sd_hash) {
      return Err(Error::KeyBindingFailed(
        "sd_hash does not match the presented disclosures".to_string(),
      ));
    }

    if let Some(expected_aud) = &self.config.expected_audience {
      if &kb.claims().aud != expected_aud {
        return Err(Error::KeyBindingFailed("aud does not match the expected audience".to_string()));
      }
    }
    if let Some(expected_nonce) = &self.config.expected_nonce {
      if &kb.claims().nonce != expected_nonce {
        return Err(Error::KeyBindingFailed("nonce does not match the expected nonce".to_string()));
      }
    }

    let now = now_unix();
    let skew = self.config.clock_skew.as_secs() as i64;
    if kb.claims().iat > now + skew {
      return Err(Error::KeyBindingFailed("iat is in the future".to_string()));
    }

    Ok(true)
  }
}

fn claims_as_object(claims: &SdJwtClaims) -> Result<JsonObject> {
  serde_json::to_value(claims)
    .map_err(|e| Error::DeserializationError(e.to_string()))?
    .as_object()
    .cloned()
    .ok_or_else(|| Error::Unspecified("SD-JWT claims did not serialize to a JSON object".to_string()))
}

fn collect_digests(value: &Value, out: &mut HashSet<String>) {
  match value {
    Value::Object(object) => {
      if let Some(digests) = object.get(DIGESTS_KEY).and_then(Value::as_array) {
        out.extend(digests.iter().filter_map(Value::as_str).map(String::from));
      }
      for (key, v) in object {
        if key == DIGESTS_KEY || key == SD_ALG_KEY {
          continue;
        }
        collect_digests(v, out);
      }
    }
    Value::Array(array) => {
      for element in array {
        let array_digest = element
          .as_object()
          .filter(|o| o.len() == 1)
          .and_then(|o| o.get(ARRAY_DIGEST_KEY))
          .and_then(Value::as_str);
        match array_digest {
          Some(digest) => {
            out.insert(digest.to_string());
          }
          None => collect_digests(element, out),
        }
      }
    }
    _ => {}
  }
}

/// Byte-for-byte comparison with a running time independent of where the
/// inputs first differ, as required for `sd_hash` and other security-load-
/// bearing digest equality checks.
fn constant_time_eq(a: &str, b: &str) -> bool {
  if a.len() != b.len() {
    return false;
  }
  let diff = a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y));
  diff == 0
}

fn now_unix() -> i64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs() as i64
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::config::IssuanceConfig;
  use crate::holder::Holder;
  use crate::holder::KeyBindingRequest;
  use crate::issuer::Issuer;
  use crate::issuer::JwsSigner;
  use crate::structure::DisclosureNode;
  use crate::structure::DisclosureStructure;
  use crate::Sha256Hasher;
  use rand::SeedableRng;
  use serde_json::json;

  struct DummySigner {
    alg: &'static str,
  }

  #[async_trait]
  impl JwsSigner for DummySigner {
    fn alg(&self) -> &str {
      self.alg
    }

    async fn sign(&self, _header: &JsonObject, _payload: &JsonObject) -> anyhow::Result<Vec<u8>> {
      Ok(vec![7, 7, 7])
    }
  }

  struct DummyKeyProvider;

  #[async_trait]
  impl KeyProvider for DummyKeyProvider {
    async fn resolve(&self, _header: &JsonObject, _payload_hint: Option<&JsonObject>) -> anyhow::Result<JsonObject> {
      Ok(JsonObject::new())
    }
  }

  /// Accepts signatures produced by [`DummySigner`] (constant bytes), and
  /// rejects anything else — enough to exercise tamper-detection without
  /// linking real cryptography.
  struct DummyJwsVerifier;

  #[async_trait]
  impl JwsVerifier for DummyJwsVerifier {
    async fn verify(&self, _header: &JsonObject, _signing_input: &str, signature: &[u8], _key: &JsonObject) -> anyhow::Result<()> {
      if signature == [7, 7, 7] {
        Ok(())
      } else {
        Err(anyhow::anyhow!("signature mismatch"))
      }
    }
  }

  async fn issue_bundle(cnf: Option<RequiredKeyBinding>) -> crate::IssuanceBundle {
    let claims: JsonObject = serde_json::from_value(json!({
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
    let signer = DummySigner { alg: "ES256" };
    let issuer = Issuer::new(&signer);
    let mut rng = rand::rngs::StdRng::seed_from_u64(21);
    issuer.issue(claims, &config, cnf, &mut rng).await.unwrap()
  }

  #[tokio::test]
  async fn verifies_a_plain_presentation_and_rehydrates_claims() {
    let bundle = issue_bundle(None).await;
    let presentation = bundle.compact();

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

    let result = verifier.verify(&presentation).await.unwrap();
    assert_eq!(result.claims.get("given_name").and_then(Value::as_str), Some("Erika"));
    assert!(!result.kb_verified);
  }

  #[tokio::test]
  async fn tampered_signature_is_rejected() {
    let bundle = issue_bundle(None).await;
    let presentation = bundle.compact();
    let mut segments: Vec<&str> = presentation.split('~').collect();
    let jws_parts: Vec<&str> = segments[0].split('.').collect();
    let tampered_jws = format!("{}.{}.{}", jws_parts[0], jws_parts[1], "not-the-real-signature");
    segments[0] = &tampered_jws;
    let tampered = segments.join("~");

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

    let err = verifier.verify(&tampered).await.unwrap_err();
    assert!(matches!(err, Error::InvalidSignature(_)));
  }

  #[tokio::test]
  async fn duplicated_disclosure_is_rejected() {
    let bundle = issue_bundle(None).await;
    let prefix = bundle.sd_jwt().presentation_prefix();
    let first_disclosure = bundle.disclosures().first().unwrap().to_string();
    let tampered = format!("{prefix}{first_disclosure}~");

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

    let err = verifier.verify(&tampered).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateDisclosure { .. }));
  }

  #[tokio::test]
  async fn key_binding_with_flipped_sd_hash_fails() {
    let mut jwk = JsonObject::new();
    jwk.insert("kty".to_string(), Value::String("EC".to_string()));
    let bundle = issue_bundle(Some(RequiredKeyBinding::Jwk(jwk))).await;
    let holder = Holder::from_sd_jwt(bundle.into_sd_jwt());
    let hasher = Sha256Hasher::new();
    let signer = DummySigner { alg: "ES256" };
    let request = KeyBindingRequest::new(&signer, "ES256").aud("https://verifier.example.com").nonce("n-0s6Q");

    let (presented, _removed) = holder.create_presentation(&hasher, &[], Some(request)).await.unwrap();
    let compact = presented.presentation();

    // Flip a character inside the KB-JWT's payload segment so its `sd_hash`
    // claim no longer matches the presentation it is attached to, without
    // touching the KB-JWT's own signature bytes.
    let mut segments: Vec<&str> = compact.split('~').collect();
    let kb_segment = segments.pop().unwrap();
    let kb_parts: Vec<&str> = kb_segment.split('.').collect();
    let mut payload_bytes = crate::b64url_decode(kb_parts[1]).unwrap();
    let last = payload_bytes.len() - 2;
    payload_bytes[last] ^= 0xFF;
    let tampered_payload = crate::b64url_encode(payload_bytes);
    let tampered_kb = format!("{}.{}.{}", kb_parts[0], tampered_payload, kb_parts[2]);
    segments.push(&tampered_kb);
    let tampered = segments.join("~");

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let verifier = Verifier::new(&key_provider, &jws_verifier, VerificationConfig::default());

    let err = verifier.verify(&tampered).await.unwrap_err();
    assert!(matches!(err, Error::KeyBindingFailed(_)) || matches!(err, Error::DeserializationError(_)));
  }

  #[tokio::test]
  async fn valid_key_binding_verifies() {
    let mut jwk = JsonObject::new();
    jwk.insert("kty".to_string(), Value::String("EC".to_string()));
    let bundle = issue_bundle(Some(RequiredKeyBinding::Jwk(jwk))).await;
    let holder = Holder::from_sd_jwt(bundle.into_sd_jwt());
    let hasher = Sha256Hasher::new();
    let signer = DummySigner { alg: "ES256" };
    let request = KeyBindingRequest::new(&signer, "ES256").aud("https://verifier.example.com").nonce("n-0s6Q");

    let (presented, _removed) = holder.create_presentation(&hasher, &[], Some(request)).await.unwrap();
    let compact = presented.presentation();

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let config = VerificationConfig {
      expected_audience: Some("https://verifier.example.com".to_string()),
      expected_nonce: Some("n-0s6Q".to_string()),
      require_kb: true,
      ..VerificationConfig::default()
    };
    let verifier = Verifier::new(&key_provider, &jws_verifier, config);

    let result = verifier.verify(&compact).await.unwrap();
    assert!(result.kb_verified);
  }

  #[test]
  fn constant_time_eq_rejects_differing_lengths_and_content() {
    assert!(constant_time_eq("abc", "abc"));
    assert!(!constant_time_eq("abc", "abd"));
    assert!(!constant_time_eq("abc", "ab"));
  }
}
