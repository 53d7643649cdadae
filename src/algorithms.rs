// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The algorithm registry (C2): a fixed allow-list of digest algorithms, and
//! a caller-extensible allow-list of JWS signature algorithms.

use std::collections::HashSet;

use strum::EnumIter;
use strum::IntoEnumIterator;

use crate::Error;
use crate::Result;

/// A digest algorithm allowed for computing disclosure digests.
///
/// Weak algorithms (`md5`, `sha-1`) are not representable by this type:
/// lookup of their names via [`DigestAlgorithm::from_name`] fails with
/// [`Error::AlgorithmDisallowed`], not [`Error::UnsupportedAlgorithm`] — the
/// caller cannot opt in by any means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum DigestAlgorithm {
  /// SHA-256, the default.
  Sha256,
  /// SHA-384.
  Sha384,
  /// SHA-512.
  Sha512,
}

const WEAK_ALGORITHMS: &[&str] = &["sha-1", "sha1", "md5"];

impl DigestAlgorithm {
  /// The IANA "Hash Name String" identifier for this algorithm.
  pub fn name(self) -> &'static str {
    match self {
      Self::Sha256 => "sha-256",
      Self::Sha384 => "sha-384",
      Self::Sha512 => "sha-512",
    }
  }

  /// Looks up an algorithm by its wire name.
  ///
  /// ## Errors
  /// - [`Error::AlgorithmDisallowed`] if `name` names a recognized-but-weak
  ///   algorithm (`sha-1`, `md5`, ...).
  /// - [`Error::UnsupportedAlgorithm`] if `name` is not recognized at all.
  pub fn from_name(name: &str) -> Result<Self> {
    if WEAK_ALGORITHMS.contains(&name) {
      return Err(Error::AlgorithmDisallowed(name.to_string()));
    }
    Self::iter()
      .find(|alg| alg.name() == name)
      .ok_or_else(|| Error::UnsupportedAlgorithm(name.to_string()))
  }

  /// Hashes `bytes`, delegating to the `iota-crypto` primitives behind the
  /// `sha` feature.
  #[cfg(feature = "sha")]
  pub fn hash(self, bytes: &[u8]) -> Result<Vec<u8>> {
    use crypto::hashes::sha::SHA256;
    use crypto::hashes::sha::SHA256_LEN;
    use crypto::hashes::sha::SHA384;
    use crypto::hashes::sha::SHA384_LEN;
    use crypto::hashes::sha::SHA512;
    use crypto::hashes::sha::SHA512_LEN;

    Ok(match self {
      Self::Sha256 => {
        let mut out = [0u8; SHA256_LEN];
        SHA256(bytes, &mut out);
        out.to_vec()
      }
      Self::Sha384 => {
        let mut out = [0u8; SHA384_LEN];
        SHA384(bytes, &mut out);
        out.to_vec()
      }
      Self::Sha512 => {
        let mut out = [0u8; SHA512_LEN];
        SHA512(bytes, &mut out);
        out.to_vec()
      }
    })
  }

  #[cfg(not(feature = "sha"))]
  pub fn hash(self, _bytes: &[u8]) -> Result<Vec<u8>> {
    Err(Error::UnsupportedAlgorithm(format!(
      "{} (crate built without the `sha` feature)",
      self.name()
    )))
  }
}

impl Default for DigestAlgorithm {
  fn default() -> Self {
    Self::Sha256
  }
}

/// The default set of signature algorithm identifiers an issuer or verifier
/// accepts; callers may widen this set at construction time but never widen
/// the digest allow-list above.
#[derive(Debug, Clone)]
pub struct SignatureAlgorithmRegistry {
  allowed: HashSet<String>,
}

impl Default for SignatureAlgorithmRegistry {
  fn default() -> Self {
    Self {
      allowed: ["ES256", "ES384", "ES512", "EdDSA"]
        .into_iter()
        .map(String::from)
        .collect(),
    }
  }
}

impl SignatureAlgorithmRegistry {
  /// An empty registry; use [`SignatureAlgorithmRegistry::allow`] to
  /// populate it.
  pub fn empty() -> Self {
    Self {
      allowed: HashSet::new(),
    }
  }

  /// Adds `alg` to the allow-list, returning `self` for chaining.
  pub fn allow(mut self, alg: impl Into<String>) -> Self {
    self.allowed.insert(alg.into());
    self
  }

  /// Returns whether `alg` is permitted.
  pub fn is_allowed(&self, alg: &str) -> bool {
    self.allowed.contains(alg)
  }

  /// Validates `alg`, converting a miss into [`Error::AlgorithmDisallowed`].
  pub fn validate(&self, alg: &str) -> Result<()> {
    if self.is_allowed(alg) {
      Ok(())
    } else {
      Err(Error::AlgorithmDisallowed(alg.to_string()))
    }
  }
}
