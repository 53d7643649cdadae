// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The object decoder: rehydrates a disclosed claim tree by substituting
//! each digest placeholder with the plaintext carried by its matching
//! disclosure, recursively. This is the tree-shaping half of verification;
//! it does not check signatures, uniqueness, or superfluous disclosures —
//! see [`crate::Verifier`] for the full pipeline.

use std::collections::HashMap;
use std::collections::HashSet;

use serde_json::Map;
use serde_json::Value;

use crate::disclosure::Disclosure;
use crate::Result;
use crate::ARRAY_DIGEST_KEY;
use crate::DIGESTS_KEY;
use crate::SD_ALG_KEY;

/// Substitutes digests in an SD-JWT object with their corresponding
/// plaintext values, provided by disclosures.
///
/// `disclosures` maps a disclosure's digest (under the payload's
/// `_sd_alg`) to the parsed [`Disclosure`] it names. A digest with no
/// matching entry — a decoy, or one consumed by a different claim name
/// collision — is dropped silently, matching the verifier's per-step 8
/// "unmatched digests are not an error" rule; the caller's earlier
/// uniqueness/superfluous checks are what actually enforce that every
/// *disclosure* got used.
#[derive(Debug, Default, Clone, Copy)]
pub struct SdObjectDecoder;

impl SdObjectDecoder {
  /// Creates a new [`SdObjectDecoder`].
  pub fn new() -> Self {
    Self
  }

  /// Decodes `object`, recursively replacing its `_sd` digests and `...`
  /// array placeholders with the plaintext from `disclosures`, and
  /// dropping `_sd_alg` from the output.
  pub fn decode(&self, object: &Map<String, Value>, disclosures: &HashMap<String, Disclosure>) -> Result<Map<String, Value>> {
    let mut consumed = HashSet::new();
    Ok(self.decode_object(object, disclosures, &mut consumed))
  }

  /// Variant of [`Self::decode`] that also reports, via `consumed`, which
  /// digests were actually substituted. Used by [`crate::Verifier`] to
  /// enforce that every presented disclosure is consumed exactly once: a
  /// digest already in `consumed` is treated as already satisfied and is
  /// left in place rather than substituted a second time.
  pub fn decode_with_consumption(
    &self,
    object: &Map<String, Value>,
    disclosures: &HashMap<String, Disclosure>,
    consumed: &mut HashSet<String>,
  ) -> Map<String, Value> {
    self.decode_object(object, disclosures, consumed)
  }

  fn decode_object(
    &self,
    object: &Map<String, Value>,
    disclosures: &HashMap<String, Disclosure>,
    consumed: &mut HashSet<String>,
  ) -> Map<String, Value> {
    let mut output = Map::new();

    for (key, value) in object {
      if key == DIGESTS_KEY || key == SD_ALG_KEY {
        continue;
      }
      output.insert(key.clone(), self.decode_value(value, disclosures, consumed));
    }

    if let Some(digests) = object.get(DIGESTS_KEY).and_then(Value::as_array) {
      for digest in digests.iter().filter_map(Value::as_str) {
        if consumed.contains(digest) {
          continue;
        }
        let Some(disclosure) = disclosures.get(digest) else {
          continue;
        };
        let Some(name) = disclosure.claim_name.clone() else {
          continue;
        };
        consumed.insert(digest.to_string());
        let decoded_value = self.decode_value(&disclosure.claim_value, disclosures, consumed);
        output.insert(name, decoded_value);
      }
    }

    output
  }

  fn decode_array(
    &self,
    array: &[Value],
    disclosures: &HashMap<String, Disclosure>,
    consumed: &mut HashSet<String>,
  ) -> Vec<Value> {
    let mut output = Vec::with_capacity(array.len());
    for element in array {
      if let Some(digest) = element
        .as_object()
        .filter(|o| o.len() == 1)
        .and_then(|o| o.get(ARRAY_DIGEST_KEY))
        .and_then(Value::as_str)
      {
        if consumed.contains(digest) {
          continue;
        }
        let Some(disclosure) = disclosures.get(digest) else {
          continue;
        };
        if disclosure.claim_name.is_some() {
          continue;
        }
        consumed.insert(digest.to_string());
        output.push(self.decode_value(&disclosure.claim_value, disclosures, consumed));
      } else {
        output.push(self.decode_value(element, disclosures, consumed));
      }
    }
    output
  }

  fn decode_value(&self, value: &Value, disclosures: &HashMap<String, Disclosure>, consumed: &mut HashSet<String>) -> Value {
    match value {
      Value::Object(object) => Value::Object(self.decode_object(object, disclosures, consumed)),
      Value::Array(array) => Value::Array(self.decode_array(array, disclosures, consumed)),
      other => other.clone(),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::hasher::Hasher;
  use crate::hasher::Sha256Hasher;
  use serde_json::json;

  fn digest_map(disclosures: Vec<Disclosure>) -> HashMap<String, Disclosure> {
    let hasher = Sha256Hasher::new();
    disclosures
      .into_iter()
      .map(|d| (hasher.encoded_digest(d.as_str()), d))
      .collect()
  }

  #[test]
  fn rehydrates_object_member() {
    let disclosure = Disclosure::new("salt", Some("given_name".to_string()), Value::String("Erika".into()));
    let hasher = Sha256Hasher::new();
    let digest = hasher.encoded_digest(disclosure.as_str());
    let object: Map<String, Value> = serde_json::from_value(json!({
      "_sd": [digest],
      "_sd_alg": "sha-256",
      "iss": "https://issuer.example.com",
    }))
    .unwrap();

    let decoded = SdObjectDecoder::new().decode(&object, &digest_map(vec![disclosure])).unwrap();
    assert_eq!(decoded.get("given_name"), Some(&Value::String("Erika".to_string())));
    assert!(decoded.get("_sd").is_none());
    assert!(decoded.get("_sd_alg").is_none());
  }

  #[test]
  fn rehydrates_array_entry_and_drops_decoys() {
    let disclosure = Disclosure::new("salt", None, Value::String("US".into()));
    let hasher = Sha256Hasher::new();
    let digest = hasher.encoded_digest(disclosure.as_str());
    let object: Map<String, Value> = serde_json::from_value(json!({
      "nationalities": [{"...": digest}, {"...": "unmatched-decoy-digest"}],
    }))
    .unwrap();

    let decoded = SdObjectDecoder::new().decode(&object, &digest_map(vec![disclosure])).unwrap();
    let arr = decoded.get("nationalities").unwrap().as_array().unwrap();
    assert_eq!(arr, &vec![Value::String("US".to_string())]);
  }

  #[test]
  fn recurses_into_nested_objects() {
    let disclosure = Disclosure::new("salt", Some("country".to_string()), Value::String("JP".into()));
    let hasher = Sha256Hasher::new();
    let digest = hasher.encoded_digest(disclosure.as_str());
    let object: Map<String, Value> = serde_json::from_value(json!({
      "address": {"_sd": [digest], "region": "Kanto"},
    }))
    .unwrap();

    let decoded = SdObjectDecoder::new().decode(&object, &digest_map(vec![disclosure])).unwrap();
    let address = decoded.get("address").unwrap().as_object().unwrap();
    assert_eq!(address.get("country"), Some(&Value::String("JP".to_string())));
    assert_eq!(address.get("region"), Some(&Value::String("Kanto".to_string())));
  }
}
