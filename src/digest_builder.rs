// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The digest builder (C4): accumulates real and decoy digests for a single
//! container (object or array) and produces the lexically-sorted `_sd`
//! list the encoder places in the output tree.

use indexmap::IndexMap;
use rand::Rng;

use crate::algorithms::DigestAlgorithm;
use crate::codec;
use crate::disclosure::DisclosureRng;
use crate::Result;

/// Accumulates disclosure and decoy digests for one container while the
/// object encoder (C5) walks it. A fresh builder is used per container so
/// state never leaks across sibling objects or across separate `encode`
/// calls.
#[derive(Debug, Default)]
pub struct DigestBuilder {
  /// Maps claim name to its digest; later insertions win, matching the
  /// "later-wins" rule for duplicate member names in the source tree.
  name_to_digest: IndexMap<String, String>,
  /// Digests not attributable to any claim name (array-element
  /// disclosures feed their placeholder independently, so this builder
  /// only needs to track object-member digests plus decoys here).
  decoy_set: Vec<String>,
}

impl DigestBuilder {
  /// Starts a new, empty builder.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers the digest of an object-member disclosure under `name`.
  /// A later call with the same `name` replaces the earlier digest.
  pub fn add_disclosure_digest(&mut self, name: impl Into<String>, digest: String) {
    self.name_to_digest.insert(name.into(), digest);
  }

  /// Draws a random 64-byte preimage, hashes it under `alg`, and records the
  /// result as a decoy digest.
  pub fn add_decoy_digest(&mut self, alg: DigestAlgorithm, rng: &mut impl DisclosureRng) -> Result<()> {
    self.decoy_set.push(random_decoy_digest(alg, rng)?);
    Ok(())
  }

  /// Returns the number of real (non-decoy) digests accumulated so far.
  pub fn real_count(&self) -> usize {
    self.name_to_digest.len()
  }

  /// Consumes the builder, returning the lexically-sorted union of real and
  /// decoy digests — the list that becomes the `_sd` array.
  pub fn build(self) -> Vec<String> {
    let mut all: Vec<String> = self
      .name_to_digest
      .into_values()
      .chain(self.decoy_set)
      .collect();
    all.sort_unstable();
    all
  }
}

/// Draws a random 64-byte preimage and hashes it under `alg`, producing a
/// digest indistinguishable from a real disclosure's. Used both by
/// [`DigestBuilder::add_decoy_digest`] (object containers) and directly by
/// the array encoder, which places decoy placeholders at random positions
/// rather than folding them into a name-keyed map.
pub fn random_decoy_digest(alg: DigestAlgorithm, rng: &mut impl DisclosureRng) -> Result<String> {
  let mut preimage = [0u8; 64];
  rng.fill(&mut preimage);
  Ok(codec::digest(alg, &preimage)?.text)
}

/// Resolves the decoy count for a container of size `n` per the
/// `[min, max]` policy: `round(n * u)` where `u` is uniform over
/// `[min, max]`, or exactly `min` when `min == max`.
pub fn decoy_count(n: usize, min: f64, max: f64, rng: &mut impl DisclosureRng) -> usize {
  let u = if min >= max { min } else { rng.gen_range(min..max) };
  (n as f64 * u).round() as usize
}

#[cfg(test)]
mod test {
  use super::*;
  use rand::SeedableRng;

  #[test]
  fn sorted_and_deduped_by_name() {
    let mut builder = DigestBuilder::new();
    builder.add_disclosure_digest("b", "zzz".to_string());
    builder.add_disclosure_digest("a", "aaa".to_string());
    builder.add_disclosure_digest("a", "bbb".to_string());
    let built = builder.build();
    assert_eq!(built, vec!["bbb".to_string(), "zzz".to_string()]);
  }

  #[test]
  fn decoy_count_respects_fixed_ratio() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    assert_eq!(decoy_count(10, 2.0, 2.0, &mut rng), 20);
    assert_eq!(decoy_count(0, 2.0, 2.0, &mut rng), 0);
  }

  #[test]
  fn decoys_are_indistinguishable_in_shape() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let mut builder = DigestBuilder::new();
    builder.add_disclosure_digest("real", "x".repeat(43));
    builder.add_decoy_digest(DigestAlgorithm::Sha256, &mut rng).unwrap();
    let built = builder.build();
    // Both entries are 43-char base64url sha-256 digests; a decoy can't be
    // distinguished from a real digest by its length or alphabet.
    assert!(built.iter().all(|d| d.len() == 43));
  }
}
