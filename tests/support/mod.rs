// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Deterministic fake collaborators shared across the integration tests:
//! a signer/verifier pair that "signs" by returning a fixed byte string and
//! "verifies" by comparing against it, a key provider that never actually
//! looks anything up, and a status-list transport backed by an in-memory
//! signed list. None of this links real cryptography — the point of these
//! tests is the selective-disclosure and revocation logic around it, which
//! the injected collaborators are deliberately blind to.

use async_trait::async_trait;
use sd_jwt_vc::JsonObject;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Signs with a fixed signature, tagged by `alg`.
pub struct FixedSigner {
  pub alg: &'static str,
  pub signature: Vec<u8>,
}

impl FixedSigner {
  pub fn new(alg: &'static str, signature: impl Into<Vec<u8>>) -> Self {
    Self {
      alg,
      signature: signature.into(),
    }
  }
}

#[async_trait]
impl sd_jwt_vc::JwsSigner for FixedSigner {
  fn alg(&self) -> &str {
    self.alg
  }

  async fn sign(&self, _header: &JsonObject, _payload: &JsonObject) -> anyhow::Result<Vec<u8>> {
    Ok(self.signature.clone())
  }
}

/// Resolves to an empty JWK unconditionally; these tests never inspect the
/// key's contents, only whether [`FixedVerifier`] accepted the signature.
pub struct OpaqueKeyProvider;

#[async_trait]
impl sd_jwt_vc::KeyProvider for OpaqueKeyProvider {
  async fn resolve(&self, _header: &JsonObject, _payload_hint: Option<&JsonObject>) -> anyhow::Result<JsonObject> {
    Ok(JsonObject::new())
  }
}

/// Accepts only a fixed signature byte string, rejecting anything else —
/// enough to exercise tamper-detection without a real signature scheme.
pub struct FixedVerifier {
  pub expected: Vec<u8>,
}

impl FixedVerifier {
  pub fn new(expected: impl Into<Vec<u8>>) -> Self {
    Self { expected: expected.into() }
  }
}

#[async_trait]
impl sd_jwt_vc::JwsVerifier for FixedVerifier {
  async fn verify(&self, _header: &JsonObject, _signing_input: &str, signature: &[u8], _key: &JsonObject) -> anyhow::Result<()> {
    if signature == self.expected.as_slice() {
      Ok(())
    } else {
      Err(anyhow::anyhow!("signature mismatch"))
    }
  }
}

/// A status-list transport backed by one fixed, pre-signed bit vector,
/// counting how many times it was fetched.
pub struct FakeStatusListTransport {
  pub calls: AtomicUsize,
  body: Vec<u8>,
}

impl FakeStatusListTransport {
  /// Builds a transport serving a status list whose `sub` is `bits`,
  /// signed with `signature` under `alg`.
  pub fn new(bits: &[u8], alg: &str, signature: Vec<u8>) -> Self {
    use sd_jwt_vc::jwt::Jwt;
    use serde_json::json;

    #[derive(serde::Serialize)]
    struct Claims {
      sub: String,
      iss: String,
      iat: i64,
    }

    let claims = Claims {
      sub: sd_jwt_vc::b64url_encode(bits),
      iss: "https://issuer.example.com".to_string(),
      iat: 1_683_000_000,
    };
    let mut header = JsonObject::new();
    header.insert("alg".to_string(), json!(alg));
    header.insert("typ".to_string(), json!("statuslist+jwt"));
    let jwt = Jwt::new(header, claims, signature);
    Self {
      calls: AtomicUsize::new(0),
      body: jwt.to_string().into_bytes(),
    }
  }

  pub fn call_count(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl sd_jwt_vc::StatusListTransport for FakeStatusListTransport {
  async fn get(&self, _uri: &str, _deadline: Duration, _cancel: &dyn sd_jwt_vc::CancellationToken) -> anyhow::Result<(Vec<u8>, String)> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok((self.body.clone(), "application/statuslist+jwt".to_string()))
  }
}
