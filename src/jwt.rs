// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A generic compact-JWS wrapper: `<header>.<payload>.<signature>`, each
//! segment base64url-encoded. This crate never verifies or produces the
//! signature bytes itself — that is delegated to the injected
//! [`crate::issuer::JwsSigner`] / [`crate::verifier::KeyProvider`]
//! collaborators — it only owns parsing, serialization, and exposing the
//! exact signing input bytes a collaborator needs.
//!
//! A signature is computed over the *exact bytes* of `<header_b64>.
//! <payload_b64>` as received, not over a re-serialization of the decoded
//! header/claims: two JSON encoders can disagree on whitespace or key
//! order for the same logical object, and a signature only verifies
//! against the bytes it was actually computed over. A [`Jwt`] built fresh
//! (via [`Jwt::new`], ahead of signing) has no received bytes yet, so it
//! serializes `header`/`claims` itself; a [`Jwt`] obtained via
//! [`FromStr::from_str`] instead retains the original base64url segments
//! and replays them verbatim.

use std::fmt::Display;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;
use crate::Error;
use crate::JsonObject;
use crate::Result;

/// The base64url segments exactly as received on the wire, kept so the
/// signing input can be replayed byte-for-byte instead of reconstructed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawSegments {
  header_b64: String,
  payload_b64: String,
}

/// A parsed (or about-to-be-signed) compact JWS with typed claims.
#[derive(Debug)]
pub struct Jwt<T> {
  /// The JOSE header.
  pub header: JsonObject,
  /// The typed claims set.
  pub claims: T,
  /// The raw signature bytes.
  pub signature: Vec<u8>,
  /// The originally-received `header_b64`/`payload_b64`, if this [`Jwt`]
  /// was obtained by parsing rather than freshly constructed.
  raw: Option<RawSegments>,
}

impl<T> Jwt<T> {
  /// Builds a JWT from its parts, e.g. after signing. The signing input is
  /// derived by serializing `header`/`claims` at the point of use, since
  /// there are no received bytes to preserve yet.
  pub fn new(header: JsonObject, claims: T, signature: Vec<u8>) -> Self {
    Self {
      header,
      claims,
      signature,
      raw: None,
    }
  }
}

impl<T: Serialize> Jwt<T> {
  /// The ASCII signing input `<header_b64>.<payload_b64>`, exactly what a
  /// [`crate::issuer::JwsSigner`] must sign and a
  /// [`crate::verifier::KeyProvider`]-resolved verifier must check. Replays
  /// the originally-received segments verbatim when this [`Jwt`] came from
  /// [`FromStr::from_str`]; otherwise serializes `header`/`claims` fresh.
  pub fn signing_input(&self) -> Result<String> {
    if let Some(raw) = &self.raw {
      return Ok(format!("{}.{}", raw.header_b64, raw.payload_b64));
    }
    let header_b64 = codec::b64url_encode(serde_json::to_vec(&self.header).map_err(|e| Error::DeserializationError(e.to_string()))?);
    let payload_b64 = codec::b64url_encode(serde_json::to_vec(&self.claims).map_err(|e| Error::DeserializationError(e.to_string()))?);
    Ok(format!("{header_b64}.{payload_b64}"))
  }
}

impl<T: Serialize> Display for Jwt<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let signing_input = self.signing_input().map_err(|_| std::fmt::Error)?;
    let signature_b64 = codec::b64url_encode(&self.signature);
    write!(f, "{signing_input}.{signature_b64}")
  }
}

impl<T: DeserializeOwned> FromStr for Jwt<T> {
  type Err = Error;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    let parts: Vec<&str> = s.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = parts[..] else {
      return Err(Error::MalformedPresentation(format!(
        "JWS must have 3 dot-separated segments, found {}",
        parts.len()
      )));
    };
    let header: JsonObject = serde_json::from_slice(&codec::b64url_decode(header_b64)?)
      .map_err(|e| Error::DeserializationError(format!("JWS header: {e}")))?;
    let claims: T = serde_json::from_slice(&codec::b64url_decode(payload_b64)?)
      .map_err(|e| Error::DeserializationError(format!("JWS payload: {e}")))?;
    let signature = codec::b64url_decode(signature_b64)?;
    Ok(Self {
      header,
      claims,
      signature,
      raw: Some(RawSegments {
        header_b64: header_b64.to_string(),
        payload_b64: payload_b64.to_string(),
      }),
    })
  }
}

impl<T: Clone> Clone for Jwt<T> {
  fn clone(&self) -> Self {
    Self {
      header: self.header.clone(),
      claims: self.claims.clone(),
      signature: self.signature.clone(),
      raw: self.raw.clone(),
    }
  }
}

/// Equality is semantic — it compares `header`/`claims`/`signature`, not
/// whether the raw received bytes happen to be preserved.
impl<T: PartialEq> PartialEq for Jwt<T> {
  fn eq(&self, other: &Self) -> bool {
    self.header == other.header && self.claims == other.claims && self.signature == other.signature
  }
}
impl<T: Eq> Eq for Jwt<T> {}
