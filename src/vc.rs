// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The SD-JWT VC profile (C9): layers `vct` presence, issuer trust, and
//! status-list revocation on top of the core [`crate::Verifier`] pipeline,
//! deliberately without letting that pipeline gate on the issuer itself —
//! trust here is a VC-profile decision, not a core one.

use std::ops::Deref;
use std::ops::DerefMut;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::config::VerificationConfig;
use crate::key_binding::RequiredKeyBinding;
use crate::status_list::StatusListEngine;
use crate::verifier::JwsVerifier;
use crate::verifier::KeyProvider;
use crate::verifier::Verifier;
use crate::Error;
use crate::JsonObject;
use crate::Result;

/// A pointer into a status list: which list (`uri`) and which bit (`idx`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusRef {
  /// Location of the status-list JWS.
  pub uri: String,
  /// Index of this credential's bit within the list.
  pub idx: u64,
}

/// The `status` claim's shape: currently only the `status_list` mechanism is
/// recognized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
  /// The status-list reference.
  pub status_list: StatusRef,
}

/// Claims carried by an SD-JWT VC payload, once rehydrated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SdJwtVcClaims {
  /// Verifiable Credential Type, required by the VC profile.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub vct: Option<String>,
  /// Credential issuer identifier.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub iss: Option<String>,
  /// Subject identifier.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sub: Option<String>,
  /// Issued-at.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub iat: Option<i64>,
  /// Not-before.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nbf: Option<i64>,
  /// Expiry.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exp: Option<i64>,
  /// Confirmation key, if this credential binds one.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cnf: Option<RequiredKeyBinding>,
  /// Revocation/suspension reference.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  /// Every other disclosed or always-visible claim.
  #[serde(flatten)]
  pub properties: JsonObject,
}

impl Deref for SdJwtVcClaims {
  type Target = JsonObject;
  fn deref(&self) -> &Self::Target {
    &self.properties
  }
}

impl DerefMut for SdJwtVcClaims {
  fn deref_mut(&mut self) -> &mut Self::Target {
    &mut self.properties
  }
}

/// The outcome of a successful [`VcVerifier::verify_vc`].
#[derive(Debug, Clone)]
pub struct VcVerificationResult {
  /// The rehydrated, typed VC claims.
  pub vc: SdJwtVcClaims,
  /// Whether a Key-Binding JWT was presented and verified.
  pub kb_verified: bool,
}

/// Verifies SD-JWT VC presentations: the core [`Verifier`] pipeline, plus
/// `vct` presence, trusted-issuer matching, and status-list revocation.
pub struct VcVerifier<'a> {
  verifier: Verifier<'a>,
  trusted_issuer: Option<String>,
  status_list: Option<&'a StatusListEngine<'a>>,
}

impl<'a> VcVerifier<'a> {
  /// Builds a VC verifier. `config.trusted_issuer`, if set, is enforced here
  /// against the VC's `iss` rather than passed down to the core pipeline.
  /// `status_list` is required only for credentials that actually carry a
  /// `status` claim; a credential without one verifies without it.
  pub fn new(
    key_provider: &'a dyn KeyProvider,
    jws_verifier: &'a dyn JwsVerifier,
    config: VerificationConfig,
    status_list: Option<&'a StatusListEngine<'a>>,
  ) -> Self {
    let trusted_issuer = config.trusted_issuer.clone();
    let mut inner_config = config;
    inner_config.trusted_issuer = None;
    Self {
      verifier: Verifier::new(key_provider, jws_verifier, inner_config),
      trusted_issuer,
      status_list,
    }
  }

  /// Verifies `presentation` as an SD-JWT VC.
  ///
  /// ## Errors
  /// Everything [`Verifier::verify`] can fail with, plus
  /// [`Error::MissingRequiredClaim`] if `vct` is absent,
  /// [`Error::UntrustedIssuer`] if `iss` does not match the configured
  /// trusted issuer, [`Error::StatusListUnavailable`] if the credential
  /// carries a `status` claim but no status-list engine was configured, and
  /// [`Error::Revoked`] if the status-list lookup reports revocation.
  pub async fn verify_vc(&self, presentation: &str) -> Result<VcVerificationResult> {
    let sd_jwt = crate::sd_jwt::SdJwt::parse(presentation)?;
    let base = self.verifier.verify_parsed(&sd_jwt).await?;

    let vc: SdJwtVcClaims =
      serde_json::from_value(Value::Object(base.claims)).map_err(|e| Error::DeserializationError(e.to_string()))?;

    if vc.vct.is_none() {
      return Err(Error::MissingRequiredClaim("vct"));
    }

    if let Some(expected) = &self.trusted_issuer {
      if vc.iss.as_deref() != Some(expected.as_str()) {
        return Err(Error::UntrustedIssuer(format!(
          "issuer {:?} is not in the trusted set (\"{expected}\")",
          vc.iss
        )));
      }
    }

    if let Some(status) = &vc.status {
      let engine = self.status_list.ok_or_else(|| {
        Error::StatusListUnavailable(
          "credential carries a status claim but no status-list engine was configured".to_string(),
        )
      })?;
      if engine.is_revoked(&status.status_list.uri, status.status_list.idx).await? {
        return Err(Error::Revoked);
      }
    }

    Ok(VcVerificationResult {
      vc,
      kb_verified: base.kb_verified,
    })
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::config::IssuanceConfig;
  use crate::issuer::Issuer;
  use crate::issuer::JwsSigner;
  use crate::structure::DisclosureStructure;
  use async_trait::async_trait;
  use rand::SeedableRng;
  use serde_json::json;

  struct DummySigner;

  #[async_trait]
  impl JwsSigner for DummySigner {
    fn alg(&self) -> &str {
      "ES256"
    }

    async fn sign(&self, _header: &JsonObject, _payload: &JsonObject) -> anyhow::Result<Vec<u8>> {
      Ok(vec![4, 4, 4])
    }
  }

  struct DummyKeyProvider;

  #[async_trait]
  impl KeyProvider for DummyKeyProvider {
    async fn resolve(&self, _header: &JsonObject, _payload_hint: Option<&JsonObject>) -> anyhow::Result<JsonObject> {
      Ok(JsonObject::new())
    }
  }

  struct DummyJwsVerifier;

  #[async_trait]
  impl JwsVerifier for DummyJwsVerifier {
    async fn verify(&self, _header: &JsonObject, _signing_input: &str, signature: &[u8], _key: &JsonObject) -> anyhow::Result<()> {
      if signature == [4, 4, 4] {
        Ok(())
      } else {
        Err(anyhow::anyhow!("signature mismatch"))
      }
    }
  }

  async fn issue_vc(claims: Value) -> String {
    let claims: JsonObject = serde_json::from_value(claims).unwrap();
    let config = IssuanceConfig::new(DisclosureStructure::new());
    let signer = DummySigner;
    let issuer = Issuer::new(&signer).with_typ("vc+sd-jwt");
    let mut rng = rand::rngs::StdRng::seed_from_u64(13);
    let bundle = issuer.issue(claims, &config, None, &mut rng).await.unwrap();
    bundle.compact()
  }

  #[tokio::test]
  async fn requires_vct_claim() {
    let presentation = issue_vc(json!({
      "iss": "https://issuer.example.com",
      "iat": 1_683_000_000,
    }))
    .await;

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let verifier = VcVerifier::new(&key_provider, &jws_verifier, VerificationConfig::default(), None);

    let err = verifier.verify_vc(&presentation).await.unwrap_err();
    assert!(matches!(err, Error::MissingRequiredClaim("vct")));
  }

  #[tokio::test]
  async fn rejects_untrusted_issuer() {
    let presentation = issue_vc(json!({
      "iss": "https://impostor.example.com",
      "iat": 1_683_000_000,
      "vct": "https://credentials.example.com/identity",
    }))
    .await;

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let config = VerificationConfig {
      trusted_issuer: Some("https://issuer.example.com".to_string()),
      ..VerificationConfig::default()
    };
    let verifier = VcVerifier::new(&key_provider, &jws_verifier, config, None);

    let err = verifier.verify_vc(&presentation).await.unwrap_err();
    assert!(matches!(err, Error::UntrustedIssuer(_)));
  }

  #[tokio::test]
  async fn accepts_vc_with_no_status_claim_and_no_engine() {
    let presentation = issue_vc(json!({
      "iss": "https://issuer.example.com",
      "iat": 1_683_000_000,
      "vct": "https://credentials.example.com/identity",
    }))
    .await;

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let verifier = VcVerifier::new(&key_provider, &jws_verifier, VerificationConfig::default(), None);

    let result = verifier.verify_vc(&presentation).await.unwrap();
    assert_eq!(result.vc.vct.as_deref(), Some("https://credentials.example.com/identity"));
  }

  #[tokio::test]
  async fn status_claim_without_engine_is_unavailable() {
    let presentation = issue_vc(json!({
      "iss": "https://issuer.example.com",
      "iat": 1_683_000_000,
      "vct": "https://credentials.example.com/identity",
      "status": { "status_list": { "uri": "https://issuer.example.com/statuslists/1", "idx": 42 } },
    }))
    .await;

    let key_provider = DummyKeyProvider;
    let jws_verifier = DummyJwsVerifier;
    let verifier = VcVerifier::new(&key_provider, &jws_verifier, VerificationConfig::default(), None);

    let err = verifier.verify_vc(&presentation).await.unwrap_err();
    assert!(matches!(err, Error::StatusListUnavailable(_)));
  }
}
