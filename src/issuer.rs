// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The issuer (C6): turns an authored claim set into a signed SD-JWT, given
//! an [`crate::IssuanceConfig`] describing which claims to disclose and an
//! injected [`JwsSigner`].

use async_trait::async_trait;
use serde_json::json;
use serde_json::Value;

use crate::codec;
use crate::config::IssuanceConfig;
use crate::disclosure::Disclosure;
use crate::disclosure::DisclosureRng;
use crate::encoder;
use crate::jwt::Jwt;
use crate::key_binding::RequiredKeyBinding;
use crate::sd_jwt::SdJwt;
use crate::sd_jwt::SdJwtClaims;
use crate::Error;
use crate::JsonObject;
use crate::Result;

/// A JWS signing collaborator, injected so the core never links a signature
/// implementation. `sign` receives the JOSE header and JSON payload and
/// must return the raw signature bytes over `<header_b64>.<payload_b64>`.
#[async_trait]
pub trait JwsSigner: Send + Sync {
  /// The JWS `alg` identifier this signer produces signatures under.
  fn alg(&self) -> &str;

  /// Signs the compact signing input formed from `header` and `payload`.
  ///
  /// ## Errors
  /// Any error surfaces as [`crate::Error::SigningFailed`] to the caller.
  async fn sign(&self, header: &JsonObject, payload: &JsonObject) -> anyhow::Result<Vec<u8>>;
}

/// Mints SD-JWTs from an authored claim set, delegating signing to an
/// injected [`JwsSigner`].
pub struct Issuer<'s> {
  signer: &'s dyn JwsSigner,
  key_id: Option<String>,
  typ: String,
}

impl<'s> Issuer<'s> {
  /// Starts an issuer bound to `signer`, with header `typ = "sd+jwt"`.
  pub fn new(signer: &'s dyn JwsSigner) -> Self {
    Self {
      signer,
      key_id: None,
      typ: "sd+jwt".to_string(),
    }
  }

  /// Sets the header `kid`.
  pub fn with_key_id(mut self, kid: impl Into<String>) -> Self {
    self.key_id = Some(kid.into());
    self
  }

  /// Overrides the header `typ`, e.g. `"vc+sd-jwt"` for the VC profile.
  pub fn with_typ(mut self, typ: impl Into<String>) -> Self {
    self.typ = typ.into();
    self
  }

  /// Encodes `claims` per `config`, optionally binds `cnf` (the holder's
  /// confirmation key), signs the result, and returns the complete
  /// [`IssuanceBundle`].
  ///
  /// ## Errors
  /// [`Error::ReservedKey`] if an authored claim collides with `_sd`,
  /// `_sd_alg`, or `...`; [`Error::SigningFailed`] if the injected signer
  /// fails; anything [`IssuanceConfig::validate`] rejects.
  pub async fn issue(
    &self,
    claims: JsonObject,
    config: &IssuanceConfig,
    cnf: Option<RequiredKeyBinding>,
    rng: &mut impl DisclosureRng,
  ) -> Result<IssuanceBundle> {
    config.validate()?;
    let (mut payload, disclosures) = encoder::encode(claims, config, rng)?;

    if let Some(cnf) = &cnf {
      let cnf_value = serde_json::to_value(cnf).map_err(|e| Error::DeserializationError(e.to_string()))?;
      payload.insert("cnf".to_string(), cnf_value);
    }

    let claims: SdJwtClaims =
      serde_json::from_value(Value::Object(payload)).map_err(|e| Error::DeserializationError(e.to_string()))?;

    let mut header = JsonObject::new();
    header.insert("alg".to_string(), Value::String(self.signer.alg().to_string()));
    header.insert("typ".to_string(), Value::String(self.typ.clone()));
    if let Some(kid) = &self.key_id {
      header.insert("kid".to_string(), Value::String(kid.clone()));
    }

    let payload_value = serde_json::to_value(&claims).map_err(|e| Error::DeserializationError(e.to_string()))?;
    let payload_obj = payload_value
      .as_object()
      .cloned()
      .ok_or_else(|| Error::Unspecified("issuer payload did not serialize to a JSON object".to_string()))?;

    let signature = self
      .signer
      .sign(&header, &payload_obj)
      .await
      .map_err(|e| Error::SigningFailed(e.to_string()))?;

    let jwt = Jwt::new(header, claims, signature);
    let sd_jwt = SdJwt::new(jwt, disclosures, None);
    Ok(IssuanceBundle { sd_jwt })
  }
}

/// The output of [`Issuer::issue`]: a signed SD-JWT together with its
/// disclosures, ready to serialize as compact, flattened JSON, or general
/// JSON. Issuance itself never attaches a Key-Binding JWT.
#[derive(Debug, Clone)]
pub struct IssuanceBundle {
  sd_jwt: SdJwt,
}

impl IssuanceBundle {
  /// The underlying [`SdJwt`].
  pub fn sd_jwt(&self) -> &SdJwt {
    &self.sd_jwt
  }

  /// Consumes the bundle, returning the underlying [`SdJwt`].
  pub fn into_sd_jwt(self) -> SdJwt {
    self.sd_jwt
  }

  /// The disclosures emitted during issuance.
  pub fn disclosures(&self) -> &[Disclosure] {
    self.sd_jwt.disclosures()
  }

  /// The compact serialization `<JWS>~<D1>~...~<Dn>~`.
  pub fn compact(&self) -> String {
    self.sd_jwt.presentation()
  }

  /// The JWS Flattened JSON Serialization, with disclosures (and, were one
  /// attached, a KB-JWT) carried in the unprotected `header`.
  pub fn flattened_json(&self) -> Result<Value> {
    let protected = codec::b64url_encode(
      serde_json::to_vec(self.sd_jwt.header()).map_err(|e| Error::DeserializationError(e.to_string()))?,
    );
    let payload = codec::b64url_encode(
      serde_json::to_vec(self.sd_jwt.claims()).map_err(|e| Error::DeserializationError(e.to_string()))?,
    );
    let signature = codec::b64url_encode(self.sd_jwt.signature());
    let disclosures: Vec<Value> = self.disclosures().iter().map(|d| Value::String(d.to_string())).collect();

    Ok(json!({
      "payload": payload,
      "protected": protected,
      "header": { "disclosures": disclosures },
      "signature": signature,
    }))
  }

  /// The JWS General JSON Serialization. This crate only ever produces a
  /// single signature, so `signatures` carries one entry, with disclosures
  /// living in that entry's unprotected header.
  pub fn general_json(&self) -> Result<Value> {
    let protected = codec::b64url_encode(
      serde_json::to_vec(self.sd_jwt.header()).map_err(|e| Error::DeserializationError(e.to_string()))?,
    );
    let payload = codec::b64url_encode(
      serde_json::to_vec(self.sd_jwt.claims()).map_err(|e| Error::DeserializationError(e.to_string()))?,
    );
    let signature = codec::b64url_encode(self.sd_jwt.signature());
    let disclosures: Vec<Value> = self.disclosures().iter().map(|d| Value::String(d.to_string())).collect();

    Ok(json!({
      "payload": payload,
      "signatures": [{
        "protected": protected,
        "header": { "disclosures": disclosures },
        "signature": signature,
      }],
    }))
  }
}
