// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Issuance and verification configuration.

use std::time::Duration;

use crate::algorithms::DigestAlgorithm;
use crate::algorithms::SignatureAlgorithmRegistry;
use crate::structure::DisclosureStructure;

/// Configuration consumed by [`crate::Issuer::issue`] and friends.
#[derive(Debug, Clone)]
pub struct IssuanceConfig {
  /// Digest algorithm used for this issuance's `_sd` entries.
  pub digest_algorithm: DigestAlgorithm,
  /// JWS signature algorithm identifier placed in the JOSE header.
  pub signature_algorithm: String,
  /// Lower bound of the decoy-count ratio `u` in `[0.0, 10.0]`.
  pub decoy_min: f64,
  /// Upper bound of the decoy-count ratio `u` in `[0.0, 10.0]`, `>= decoy_min`.
  pub decoy_max: f64,
  /// Whether `_sd_alg` is written to the signed payload. Internally the
  /// encoder always computes digests under `digest_algorithm` regardless
  /// of this flag; setting it `false` only suppresses the claim itself,
  /// leaving verifiers to assume the sha-256 default.
  pub include_sd_alg: bool,
  /// Which leaves/branches of the claim tree become disclosures.
  pub disclosure_structure: DisclosureStructure,
}

impl IssuanceConfig {
  /// Starts a config with the given disclosure structure and all other
  /// fields at their defaults.
  pub fn new(disclosure_structure: DisclosureStructure) -> Self {
    Self {
      disclosure_structure,
      ..Self::default_without_structure()
    }
  }

  fn default_without_structure() -> Self {
    Self {
      digest_algorithm: DigestAlgorithm::default(),
      signature_algorithm: "ES256".to_string(),
      decoy_min: 0.0,
      decoy_max: 0.0,
      include_sd_alg: true,
      disclosure_structure: DisclosureStructure::new(),
    }
  }

  /// Sets the digest algorithm by its wire name (e.g. `"sha-384"`), for
  /// callers that take the algorithm as configuration rather than a
  /// compiled-in constant.
  ///
  /// ## Errors
  /// [`crate::Error::AlgorithmDisallowed`] if `name` is a recognized-but-weak
  /// algorithm (`sha-1`, `md5`); [`crate::Error::UnsupportedAlgorithm`] if
  /// `name` is not recognized at all.
  pub fn with_digest_algorithm_name(mut self, name: &str) -> crate::Result<Self> {
    self.digest_algorithm = DigestAlgorithm::from_name(name)?;
    Ok(self)
  }

  /// Validates `decoy_min <= decoy_max` and that both lie in `[0.0, 10.0]`.
  pub fn validate(&self) -> crate::Result<()> {
    if !(0.0..=10.0).contains(&self.decoy_min) || !(0.0..=10.0).contains(&self.decoy_max) {
      return Err(crate::Error::Unspecified(
        "decoy_min/decoy_max must lie in [0.0, 10.0]".to_string(),
      ));
    }
    if self.decoy_min > self.decoy_max {
      return Err(crate::Error::Unspecified("decoy_min must be <= decoy_max".to_string()));
    }
    Ok(())
  }
}

impl Default for IssuanceConfig {
  fn default() -> Self {
    Self::default_without_structure()
  }
}

/// Configuration consumed by [`crate::Verifier::verify`] and
/// [`crate::VcVerifier::verify_vc`].
#[derive(Debug, Clone)]
pub struct VerificationConfig {
  /// The issuer identifier the caller trusts, if any (VC verification
  /// compares this against the credential's `iss`).
  pub trusted_issuer: Option<String>,
  /// Allowed JWS signature algorithms.
  pub allowed_signature_algorithms: SignatureAlgorithmRegistry,
  /// Tolerance applied to `exp`/`nbf`/`iat` comparisons.
  pub clock_skew: Duration,
  /// Time-to-live for cached status-list bit vectors.
  pub status_list_cache_ttl: Duration,
  /// Deadline applied to status-list transport calls.
  pub status_list_deadline: Duration,
  /// Whether a presentation without a Key-Binding JWT is rejected.
  pub require_kb: bool,
  /// Expected KB-JWT `aud`, if any.
  pub expected_audience: Option<String>,
  /// Expected KB-JWT `nonce`, if any.
  pub expected_nonce: Option<String>,
}

impl Default for VerificationConfig {
  fn default() -> Self {
    Self {
      trusted_issuer: None,
      allowed_signature_algorithms: SignatureAlgorithmRegistry::default(),
      clock_skew: Duration::from_secs(60),
      status_list_cache_ttl: Duration::from_secs(300),
      status_list_deadline: Duration::from_secs(10),
      require_kb: false,
      expected_audience: None,
      expected_nonce: None,
    }
  }
}
