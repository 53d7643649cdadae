// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The disclosure model (C3): an immutable `(salt, name?, value)` record,
//! its canonical encoding, and its memoized digest.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Mutex;

use rand::distributions::DistString;
use rand::CryptoRng;
use rand::RngCore;
use serde_json::Value;

use crate::algorithms::DigestAlgorithm;
use crate::codec;
use crate::hasher::Hasher;
use crate::Error;
use crate::Result;

/// Minimum salt length, in bytes of base64url-alphanumeric text, sufficient
/// for >=128 bits of entropy (each alphanumeric character carries <6 bits,
/// so 22+ characters are required; 30 is kept as the floor new disclosures
/// are generated with).
pub const DEFAULT_SALT_SIZE: usize = 30;

/// A random source usable for salts and decoys. Production code should pass
/// [`rand::rngs::ThreadRng`] (via [`rand::thread_rng`]); tests may inject a
/// seeded [`rand::rngs::StdRng`] for determinism — the set of emitted
/// disclosures is then a pure function of input and seed.
pub trait DisclosureRng: RngCore + CryptoRng {}
impl<T: RngCore + CryptoRng> DisclosureRng for T {}

/// An immutable disclosure: a salted claim name/value pair (or, for array
/// entries, a salted value alone) together with its canonical encoding.
#[derive(Debug)]
pub struct Disclosure {
  /// The salt used to randomize this disclosure's digest.
  pub salt: String,
  /// The claim name, present iff this disclosure binds an object member.
  pub claim_name: Option<String>,
  /// The claim value.
  pub claim_value: Value,
  /// Base64url of the canonical JSON of `[salt, name?, value]`.
  encoded: String,
  /// Per-algorithm memoized digest text.
  digest_cache: Mutex<HashMap<DigestAlgorithm, String>>,
}

impl Disclosure {
  /// Builds a disclosure from explicit components, encoding it immediately.
  ///
  /// `name = None` produces an array-element disclosure `[salt, value]`;
  /// `name = Some(_)` produces an object-member disclosure
  /// `[salt, name, value]`.
  pub fn new(salt: impl Into<String>, claim_name: Option<String>, claim_value: Value) -> Self {
    let salt = salt.into();
    let array = match &claim_name {
      Some(name) => serde_json::json!([salt, name, claim_value]),
      None => serde_json::json!([salt, claim_value]),
    };
    let encoded = codec::b64url_encode(canonical_bytes(&array));
    Self {
      salt,
      claim_name,
      claim_value,
      encoded,
      digest_cache: Mutex::new(HashMap::new()),
    }
  }

  /// Creates an object-member disclosure with a freshly generated salt.
  pub fn create_object_disclosure(name: impl Into<String>, value: Value, rng: &mut impl DisclosureRng) -> Self {
    Self::new(gen_salt(rng, DEFAULT_SALT_SIZE), Some(name.into()), value)
  }

  /// Creates an array-element disclosure with a freshly generated salt.
  pub fn create_array_disclosure(value: Value, rng: &mut impl DisclosureRng) -> Self {
    Self::new(gen_salt(rng, DEFAULT_SALT_SIZE), None, value)
  }

  /// The base64url encoding of this disclosure, as it appears on the wire.
  pub fn as_str(&self) -> &str {
    &self.encoded
  }

  /// This disclosure's digest under `alg`, computed once and memoized.
  pub fn digest(&self, alg: DigestAlgorithm) -> Result<String> {
    let mut cache = self.digest_cache.lock().expect("digest cache mutex poisoned");
    if let Some(cached) = cache.get(&alg) {
      return Ok(cached.clone());
    }
    let computed = codec::digest(alg, self.encoded.as_bytes())?.text;
    cache.insert(alg, computed.clone());
    Ok(computed)
  }

  /// This disclosure's digest under an arbitrary [`Hasher`] implementation,
  /// for callers (e.g. [`crate::SdObjectEncoder`]) that carry a custom
  /// hasher rather than one of the registry's [`DigestAlgorithm`] members.
  /// Not memoized: custom hashers aren't `Eq + Hash`-keyable the way
  /// [`DigestAlgorithm`] is.
  pub fn digest_with(&self, hasher: &dyn Hasher) -> String {
    hasher.encoded_digest(&self.encoded)
  }

  /// Parses an encoded disclosure string, validating its shape.
  ///
  /// ## Errors
  /// [`Error::MalformedEncoding`] if the base64url is invalid;
  /// [`Error::DeserializationError`] if the decoded bytes aren't a JSON
  /// array of length 2 or 3; [`Error::ReservedKey`] if the claim name
  /// equals `_sd`, `_sd_alg`, or `...`.
  pub fn parse(s: &str) -> Result<Self> {
    let bytes = codec::b64url_decode(s)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| Error::DeserializationError(e.to_string()))?;
    let Value::Array(mut elements) = value else {
      return Err(Error::DeserializationError(
        "disclosure must decode to a JSON array".to_string(),
      ));
    };
    let (salt, claim_name, claim_value) = match elements.len() {
      2 => {
        let claim_value = elements.pop().unwrap();
        let Value::String(salt) = elements.pop().unwrap() else {
          return Err(Error::DeserializationError("disclosure salt must be a string".to_string()));
        };
        (salt, None, claim_value)
      }
      3 => {
        let claim_value = elements.pop().unwrap();
        let Value::String(claim_name) = elements.pop().unwrap() else {
          return Err(Error::DeserializationError("disclosure name must be a string".to_string()));
        };
        let Value::String(salt) = elements.pop().unwrap() else {
          return Err(Error::DeserializationError("disclosure salt must be a string".to_string()));
        };
        (salt, Some(claim_name), claim_value)
      }
      n => {
        return Err(Error::DeserializationError(format!(
          "disclosure array must have length 2 or 3, found {n}"
        )))
      }
    };
    if let Some(name) = &claim_name {
      if matches!(name.as_str(), crate::DIGESTS_KEY | crate::SD_ALG_KEY | crate::ARRAY_DIGEST_KEY) {
        return Err(Error::ReservedKey(name.clone()));
      }
    }
    Ok(Self::new(salt, claim_name, claim_value))
  }
}

fn gen_salt(rng: &mut impl DisclosureRng, len: usize) -> String {
  rand::distributions::Alphanumeric.sample_string(rng, len)
}

fn canonical_bytes(value: &Value) -> Vec<u8> {
  serde_json::to_vec(value).expect("serde_json::Value serialization is infallible")
}

impl Display for Disclosure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.encoded)
  }
}

impl FromStr for Disclosure {
  type Err = Error;
  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl Clone for Disclosure {
  fn clone(&self) -> Self {
    let cache = self.digest_cache.lock().expect("digest cache mutex poisoned").clone();
    Self {
      salt: self.salt.clone(),
      claim_name: self.claim_name.clone(),
      claim_value: self.claim_value.clone(),
      encoded: self.encoded.clone(),
      digest_cache: Mutex::new(cache),
    }
  }
}

impl PartialEq for Disclosure {
  fn eq(&self, other: &Self) -> bool {
    self.encoded == other.encoded
  }
}
impl Eq for Disclosure {}

impl std::hash::Hash for Disclosure {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.encoded.hash(state);
  }
}
