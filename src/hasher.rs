// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use multibase::Base;

use crate::algorithms::DigestAlgorithm;

/// Used to implement hash functions usable for encoding/decoding.
///
/// Implementations are expected only for algorithms listed in the IANA
/// "Named Information Hash Algorithm" registry (in practice, the members of
/// [`DigestAlgorithm`]); `dyn Hasher` is what lets verifiers pick an
/// algorithm at runtime based on a payload's `_sd_alg` claim, while
/// [`DigestAlgorithm`] is what lets the registry (C2) enforce the
/// allow-list before a `Hasher` is ever constructed.
pub trait Hasher: Send + Sync {
  /// Digests input to produce a unique fixed-size hash value in bytes.
  fn digest(&self, input: &[u8]) -> Vec<u8>;

  /// Returns the name of hash function used.
  fn alg_name(&self) -> &str;

  /// Returns the base64url-encoded digest of a `disclosure`.
  fn encoded_digest(&self, disclosure: &str) -> String {
    let hash = self.digest(disclosure.as_bytes());
    Base::Base64Url.encode(hash)
  }
}

impl Hasher for DigestAlgorithm {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    DigestAlgorithm::hash(*self, input).expect("algorithm came from the allow-list registry")
  }

  fn alg_name(&self) -> &str {
    DigestAlgorithm::name(*self)
  }
}

/// An implementation of [`Hasher`] that uses the `sha-256` hash function.
#[derive(Default, Clone, Copy, Debug)]
pub struct Sha256Hasher;

impl Sha256Hasher {
  /// Creates a new [`Sha256Hasher`].
  pub fn new() -> Self {
    Self
  }
}

impl Hasher for Sha256Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    DigestAlgorithm::Sha256.digest(input)
  }

  fn alg_name(&self) -> &str {
    DigestAlgorithm::Sha256.name()
  }
}

/// An implementation of [`Hasher`] that uses the `sha-384` hash function.
#[derive(Default, Clone, Copy, Debug)]
pub struct Sha384Hasher;

impl Hasher for Sha384Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    DigestAlgorithm::Sha384.digest(input)
  }

  fn alg_name(&self) -> &str {
    DigestAlgorithm::Sha384.name()
  }
}

/// An implementation of [`Hasher`] that uses the `sha-512` hash function.
#[derive(Default, Clone, Copy, Debug)]
pub struct Sha512Hasher;

impl Hasher for Sha512Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    DigestAlgorithm::Sha512.digest(input)
  }

  fn alg_name(&self) -> &str {
    DigestAlgorithm::Sha512.name()
  }
}

/// Resolves a boxed [`Hasher`] from an `_sd_alg` wire name, enforcing the
/// registry's allow-list.
pub fn hasher_for_alg_name(name: &str) -> crate::Result<Box<dyn Hasher>> {
  let alg = DigestAlgorithm::from_name(name)?;
  Ok(Box::new(alg))
}
