// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The holder (C7): stores an issuance, decides which disclosures to
//! reveal for a given presentation, and optionally proves possession of
//! the bound key via a Key-Binding JWT.

use serde_json::Value;

use crate::issuer::JwsSigner;
use crate::key_binding::KeyBindingJwt;
use crate::key_binding::KeyBindingJwtBuilder;
use crate::sd_jwt::SdJwt;
use crate::sd_jwt::SdJwtClaims;
use crate::Disclosure;
use crate::Hasher;
use crate::JsonObject;
use crate::Result;

/// Holds an issued SD-JWT and derives presentations from it.
#[derive(Debug, Clone)]
pub struct Holder {
  sd_jwt: SdJwt,
}

impl Holder {
  /// Parses an issuance string (compact `<JWS>~<D1>~...~<Dn>~` form, with
  /// no Key-Binding JWT segment) into a [`Holder`].
  pub fn parse(issuance: &str) -> Result<Self> {
    Ok(Self { sd_jwt: SdJwt::parse(issuance)? })
  }

  /// Wraps an already-parsed [`SdJwt`].
  pub fn from_sd_jwt(sd_jwt: SdJwt) -> Self {
    Self { sd_jwt }
  }

  /// The issuer-signed claims, with every digest still in place.
  pub fn claims(&self) -> &SdJwtClaims {
    self.sd_jwt.claims()
  }

  /// Every disclosure the issuance carries, available for presentation.
  pub fn disclosures(&self) -> &[Disclosure] {
    self.sd_jwt.disclosures()
  }

  /// The disclosures among [`Self::disclosures`] matching `predicate`,
  /// useful for deciding which paths to reveal before building a
  /// presentation.
  pub fn select(&self, predicate: impl Fn(&Disclosure) -> bool) -> Vec<&Disclosure> {
    self.disclosures().iter().filter(|d| predicate(d)).collect()
  }

  /// The fully rehydrated claim tree, with every disclosure substituted
  /// back into the payload it came from.
  pub fn disclosed_object(&self, hasher: &dyn Hasher) -> Result<JsonObject> {
    self.sd_jwt.clone().into_disclosed_object(hasher)
  }

  /// Builds a presentation: concealing every disclosure at a path in
  /// `conceal_paths` (per [`crate::SdJwtPresentationBuilder::conceal`]),
  /// and, if `key_binding` is supplied, attaching a Key-Binding JWT whose
  /// `sd_hash` binds to exactly the resulting (concealed) presentation.
  ///
  /// ## Errors
  /// [`crate::Error::InvalidPath`] if a path does not resolve to a
  /// concealable location; [`crate::Error::MissingKeyBindingJwt`] if the
  /// issuance requires key binding (`cnf` is set) but `key_binding` is
  /// `None`; [`crate::Error::InvalidHasher`]/[`crate::Error::SigningFailed`]
  /// from the Key-Binding JWT construction.
  pub async fn create_presentation(
    &self,
    hasher: &dyn Hasher,
    conceal_paths: &[&str],
    key_binding: Option<KeyBindingRequest<'_>>,
  ) -> Result<(SdJwt, Vec<Disclosure>)> {
    let mut builder = self.sd_jwt.clone().into_presentation(hasher)?;
    for path in conceal_paths {
      builder = builder.conceal(path)?;
    }

    if let Some(request) = key_binding {
      let required_alg = builder
        .claims()
        ._sd_alg
        .as_deref()
        .unwrap_or(crate::SHA_ALG_NAME)
        .to_string();
      let prefix = builder.presentation_preview()?;
      let kb_jwt = request
        .builder
        .finish_over_prefix(&prefix, &required_alg, hasher, &request.alg, request.signer)
        .await?;
      builder = builder.attach_key_binding_jwt(kb_jwt);
    }

    builder.finish()
  }
}

/// Bundles the inputs [`Holder::create_presentation`] needs to produce a
/// Key-Binding JWT: a [`KeyBindingJwtBuilder`] carrying `aud`/`nonce`/extra
/// claims, the signature algorithm to sign under, and the signer itself.
pub struct KeyBindingRequest<'s> {
  builder: KeyBindingJwtBuilder,
  alg: String,
  signer: &'s dyn JwsSigner,
}

impl<'s> KeyBindingRequest<'s> {
  /// Starts a request that will sign with `signer` under `alg`.
  pub fn new(signer: &'s dyn JwsSigner, alg: impl Into<String>) -> Self {
    Self {
      builder: KeyBindingJwtBuilder::new(),
      alg: alg.into(),
      signer,
    }
  }

  /// Sets the KB-JWT header (`typ`/`alg` are always overwritten).
  pub fn header(mut self, header: JsonObject) -> Self {
    self.builder = self.builder.header(header);
    self
  }

  /// Sets `iat`; if unset, the current time is used.
  pub fn iat(mut self, iat: i64) -> Self {
    self.builder = self.builder.iat(iat);
    self
  }

  /// Sets the verifier-supplied `aud`. Required.
  pub fn aud(mut self, aud: impl Into<String>) -> Self {
    self.builder = self.builder.aud(aud);
    self
  }

  /// Sets the verifier-supplied `nonce`. Required.
  pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
    self.builder = self.builder.nonce(nonce);
    self
  }

  /// Adds an additional KB-JWT claim.
  pub fn insert_property(mut self, name: &str, value: Value) -> Self {
    self.builder = self.builder.insert_property(name, value);
    self
  }
}
