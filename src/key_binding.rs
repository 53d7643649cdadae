// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The Key-Binding JWT (KB-JWT): a JWS signed by the holder, proving
//! possession of the key bound via `cnf`, binding to the exact
//! presentation prefix via `sd_hash`.

use std::fmt::Display;
use std::ops::Deref;
use std::ops::DerefMut;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::issuer::JwsSigner;
use crate::jwt::Jwt;
use crate::sd_jwt::SdJwt;
use crate::Error;
use crate::Hasher;
use crate::JsonObject;
use crate::Result;

/// The value of a KB-JWT's header `typ` per
/// <https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-07.html#name-key-binding-jwt>.
pub const KB_JWT_HEADER_TYP: &str = "kb+jwt";

/// The public key (or reference to one) to which presentations are bound,
/// carried as the payload's `cnf` claim.
///
/// New issuance always emits [`RequiredKeyBinding::Jwk`]; downstream
/// verifiers must accept [`RequiredKeyBinding::Kid`] as well, since it
/// appears in credentials issued by other implementations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequiredKeyBinding {
  /// An inlined JSON Web Key.
  Jwk(JsonObject),
  /// A key identifier resolved out of band (e.g. a DID URL fragment).
  Kid(String),
}

/// Claims carried by a Key-Binding JWT's payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyBindingJwtClaims {
  /// Issued-at, seconds since the Unix epoch.
  pub iat: i64,
  /// Intended audience of the presentation.
  pub aud: String,
  /// Single-use value supplied by the verifier (replay protection).
  pub nonce: String,
  /// Digest, under the issuer payload's `_sd_alg`, of the presentation
  /// prefix up to and including the last disclosure's trailing tilde.
  pub sd_hash: String,
  /// Caller-supplied additional claims.
  #[serde(flatten)]
  pub properties: JsonObject,
}

/// A parsed Key-Binding JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindingJwt(Jwt<KeyBindingJwtClaims>);

impl KeyBindingJwt {
  pub(crate) fn from_jwt(jwt: Jwt<KeyBindingJwtClaims>) -> Self {
    Self(jwt)
  }

  /// The JOSE header.
  pub fn header(&self) -> &JsonObject {
    &self.0.header
  }

  /// The typed claims.
  pub fn claims(&self) -> &KeyBindingJwtClaims {
    &self.0.claims
  }

  /// The raw signature bytes.
  pub fn signature(&self) -> &[u8] {
    &self.0.signature
  }

  /// The `<header>.<payload>` signing input, as a verifier's `JwsVerifier`
  /// would need it.
  pub fn signing_input(&self) -> Result<String> {
    self.0.signing_input()
  }
}

impl Display for KeyBindingJwt {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Display::fmt(&self.0, f)
  }
}

impl FromStr for KeyBindingJwt {
  type Err = Error;
  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Ok(Self(s.parse()?))
  }
}

/// Builds a [`KeyBindingJwt`], computing `sd_hash` from the presentation it
/// will be attached to and delegating signing to a [`JwsSigner`].
#[derive(Debug, Default)]
pub struct KeyBindingJwtBuilder {
  header: JsonObject,
  iat: Option<i64>,
  aud: Option<String>,
  nonce: Option<String>,
  properties: JsonObject,
}

impl KeyBindingJwtBuilder {
  /// Starts an empty builder.
  pub fn new() -> Self {
    Self::default()
  }

  /// Seeds the builder's additional claims from an existing JSON object,
  /// extracting recognized fields (`iat`, `aud`, `nonce`) and keeping the
  /// rest as extra properties.
  pub fn from_object(mut obj: JsonObject) -> Self {
    let iat = obj.remove("iat").and_then(|v| v.as_i64());
    let aud = obj.remove("aud").and_then(|v| v.as_str().map(str::to_owned));
    let nonce = obj.remove("nonce").and_then(|v| v.as_str().map(str::to_owned));
    obj.remove("sd_hash");
    Self {
      header: JsonObject::new(),
      iat,
      aud,
      nonce,
      properties: obj,
    }
  }

  /// Sets the JWT header; `typ` and `alg` are overwritten at [`Self::finish`].
  pub fn header(mut self, header: JsonObject) -> Self {
    self.header = header;
    self
  }

  /// Sets `iat`. If left unset, [`Self::finish`] uses the current time.
  pub fn iat(mut self, iat: i64) -> Self {
    self.iat = Some(iat);
    self
  }

  /// Sets `aud`.
  pub fn aud(mut self, aud: impl Into<String>) -> Self {
    self.aud = Some(aud.into());
    self
  }

  /// Sets `nonce`.
  pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
    self.nonce = Some(nonce.into());
    self
  }

  /// Inserts an additional claim.
  pub fn insert_property(mut self, name: &str, value: Value) -> Self {
    self.properties.insert(name.to_string(), value);
    self
  }

  /// Computes `sd_hash` over `sd_jwt`'s presentation prefix, signs, and
  /// returns the finished [`KeyBindingJwt`].
  ///
  /// ## Errors
  /// [`Error::InvalidHasher`] if `hasher`'s algorithm does not match the
  /// `_sd_alg` recorded by `sd_jwt`; [`Error::MissingRequiredClaim`] if
  /// `aud` or `nonce` was never set; [`Error::SigningFailed`] if the
  /// signer fails.
  pub async fn finish(
    self,
    sd_jwt: &SdJwt,
    hasher: &dyn Hasher,
    alg: &str,
    signer: &dyn JwsSigner,
  ) -> Result<KeyBindingJwt> {
    let required_alg = sd_jwt.claims()._sd_alg.as_deref().unwrap_or(crate::SHA_ALG_NAME).to_string();
    let prefix = sd_jwt.presentation_prefix();
    self.finish_over_prefix(&prefix, &required_alg, hasher, alg, signer).await
  }

  /// Like [`Self::finish`], but binds `sd_hash` to an arbitrary,
  /// already-computed presentation prefix rather than deriving it from a
  /// finished [`SdJwt`]. [`crate::Holder`] uses this to bind a KB-JWT to a
  /// presentation still under construction (disclosures concealed, but not
  /// yet reassembled into an [`SdJwt`]).
  pub(crate) async fn finish_over_prefix(
    self,
    prefix: &str,
    required_alg: &str,
    hasher: &dyn Hasher,
    alg: &str,
    signer: &dyn JwsSigner,
  ) -> Result<KeyBindingJwt> {
    if required_alg != hasher.alg_name() {
      return Err(Error::InvalidHasher(format!(
        "hasher \"{}\" was provided, but \"{required_alg}\" is required",
        hasher.alg_name()
      )));
    }
    let aud = self.aud.ok_or(Error::MissingRequiredClaim("aud"))?;
    let nonce = self.nonce.ok_or(Error::MissingRequiredClaim("nonce"))?;
    let iat = self.iat.unwrap_or_else(now_unix);
    let sd_hash = hasher.encoded_digest(prefix);

    let claims = KeyBindingJwtClaims {
      iat,
      aud,
      nonce,
      sd_hash,
      properties: self.properties,
    };

    let mut header = self.header;
    header.insert("typ".to_string(), Value::String(KB_JWT_HEADER_TYP.to_string()));
    header.insert("alg".to_string(), Value::String(alg.to_string()));

    let payload_value = serde_json::to_value(&claims).map_err(|e| Error::DeserializationError(e.to_string()))?;
    let payload_obj = payload_value
      .as_object()
      .cloned()
      .ok_or_else(|| Error::Unspecified("KB-JWT claims did not serialize to a JSON object".to_string()))?;

    let signature = signer
      .sign(&header, &payload_obj)
      .await
      .map_err(|e| Error::SigningFailed(e.to_string()))?;

    Ok(KeyBindingJwt::from_jwt(Jwt::new(header, claims, signature)))
  }
}

fn now_unix() -> i64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs() as i64
}

impl Deref for KeyBindingJwtClaims {
  type Target = JsonObject;
  fn deref(&self) -> &Self::Target {
    &self.properties
  }
}

impl DerefMut for KeyBindingJwtClaims {
  fn deref_mut(&mut self) -> &mut Self::Target {
    &mut self.properties
  }
}
