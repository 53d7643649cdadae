// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The object encoder (C5): recursively transforms a claim tree into an
//! SD-JWT payload tree, emitting disclosures along the way.
//!
//! Two entry points are provided. [`encode`] is the whole-tree,
//! structure-driven pass used by [`crate::Issuer`]. [`SdObjectEncoder`] is
//! the lower-level, single-path-at-a-time API for callers who want to
//! conceal one claim at a time rather than supply a full
//! [`crate::DisclosureStructure`] up front.

use std::collections::HashMap;

use rand::distributions::DistString;
use rand::Rng;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use crate::config::IssuanceConfig;
use crate::digest_builder::decoy_count;
use crate::digest_builder::random_decoy_digest;
use crate::digest_builder::DigestBuilder;
use crate::disclosure::Disclosure;
use crate::disclosure::DisclosureRng;
use crate::hasher::Hasher;
use crate::hasher::Sha256Hasher;
use crate::structure::ArrayElement;
use crate::structure::DisclosureNode;
use crate::structure::DisclosureStructure;
use crate::Error;
use crate::Result;
use crate::ARRAY_DIGEST_KEY;
use crate::DIGESTS_KEY;
use crate::RETAINED_TOP_LEVEL_CLAIMS;
use crate::SD_ALG_KEY;

const DEFAULT_SALT_SIZE: usize = 30;

/// Runs the full recursive encoding pass over a top-level claim object,
/// returning the transformed payload object and the disclosures emitted
/// along the way, in the order they were created.
///
/// ## Errors
/// [`Error::ReservedKey`] if any authored key is `_sd`, `_sd_alg`, or `...`.
pub fn encode(
  claims: Map<String, Value>,
  config: &IssuanceConfig,
  rng: &mut impl DisclosureRng,
) -> Result<(Map<String, Value>, Vec<Disclosure>)> {
  encode_object(claims, &config.disclosure_structure, config, true, rng)
}

fn encode_object(
  object: Map<String, Value>,
  structure: &DisclosureStructure,
  config: &IssuanceConfig,
  is_top_level: bool,
  rng: &mut impl DisclosureRng,
) -> Result<(Map<String, Value>, Vec<Disclosure>)> {
  let container_size = object.len();
  let mut output = Map::new();
  let mut disclosures = Vec::new();
  let mut builder = DigestBuilder::new();

  for (key, value) in object {
    crate::reject_reserved_key(&key)?;

    if is_top_level && RETAINED_TOP_LEVEL_CLAIMS.contains(&key.as_str()) {
      output.insert(key, value);
      continue;
    }

    match value {
      Value::Object(inner) => {
        let child_structure = match structure.get(&key) {
          Some(DisclosureNode::Object(map)) => map.clone(),
          _ => HashMap::new(),
        };
        let (encoded, mut child_disclosures) = encode_object(inner, &child_structure, config, false, rng)?;
        output.insert(key, Value::Object(encoded));
        disclosures.append(&mut child_disclosures);
      }
      Value::Array(items) => {
        let child_structure = match structure.get(&key) {
          Some(DisclosureNode::Array(elems)) => elems.clone(),
          _ => Vec::new(),
        };
        let (encoded, mut child_disclosures) = encode_array(items, &child_structure, config, rng)?;
        output.insert(key, Value::Array(encoded));
        disclosures.append(&mut child_disclosures);
      }
      scalar => {
        let disclosable = matches!(structure.get(&key), Some(DisclosureNode::Leaf(true)));
        if disclosable {
          let disclosure = Disclosure::create_object_disclosure(key.clone(), scalar, rng);
          let digest = disclosure.digest(config.digest_algorithm)?;
          builder.add_disclosure_digest(key, digest);
          disclosures.push(disclosure);
        } else {
          output.insert(key, scalar);
        }
      }
    }
  }

  for _ in 0..decoy_count(container_size, config.decoy_min, config.decoy_max, rng) {
    builder.add_decoy_digest(config.digest_algorithm, rng)?;
  }
  let sd_list = builder.build();
  if !sd_list.is_empty() {
    output.insert(
      DIGESTS_KEY.to_string(),
      Value::Array(sd_list.into_iter().map(Value::String).collect()),
    );
  }

  if is_top_level && config.include_sd_alg {
    output.insert(
      SD_ALG_KEY.to_string(),
      Value::String(config.digest_algorithm.name().to_string()),
    );
  }

  Ok((output, disclosures))
}

fn encode_array(
  items: Vec<Value>,
  structure: &[ArrayElement],
  config: &IssuanceConfig,
  rng: &mut impl DisclosureRng,
) -> Result<(Vec<Value>, Vec<Disclosure>)> {
  let mut output = Vec::new();
  let mut disclosures = Vec::new();

  for (index, value) in items.into_iter().enumerate() {
    match structure.get(index) {
      Some(ArrayElement::Conceal(true)) => {
        let disclosure = Disclosure::create_array_disclosure(value, rng);
        let digest = disclosure.digest(config.digest_algorithm)?;
        output.push(json!({ ARRAY_DIGEST_KEY: digest }));
        disclosures.push(disclosure);
      }
      Some(ArrayElement::Nested(node)) => {
        encode_array_element_recursing(value, Some(node), config, &mut output, &mut disclosures, rng)?;
      }
      Some(ArrayElement::Conceal(false)) | None => {
        encode_array_element_recursing(value, None, config, &mut output, &mut disclosures, rng)?;
      }
    }
  }

  for _ in 0..decoy_count(output.len(), config.decoy_min, config.decoy_max, rng) {
    let digest = random_decoy_digest(config.digest_algorithm, rng)?;
    let position = rng.gen_range(0..=output.len());
    output.insert(position, json!({ ARRAY_DIGEST_KEY: digest }));
  }

  Ok((output, disclosures))
}

fn encode_array_element_recursing(
  value: Value,
  node: Option<&DisclosureNode>,
  config: &IssuanceConfig,
  output: &mut Vec<Value>,
  disclosures: &mut Vec<Disclosure>,
  rng: &mut impl DisclosureRng,
) -> Result<()> {
  match value {
    Value::Object(inner) => {
      let child_structure = match node {
        Some(DisclosureNode::Object(map)) => map.clone(),
        _ => HashMap::new(),
      };
      let (encoded, mut child_disclosures) = encode_object(inner, &child_structure, config, false, rng)?;
      output.push(Value::Object(encoded));
      disclosures.append(&mut child_disclosures);
    }
    Value::Array(items) => {
      let child_structure = match node {
        Some(DisclosureNode::Array(elems)) => elems.clone(),
        _ => Vec::new(),
      };
      let (encoded, mut child_disclosures) = encode_array(items, &child_structure, config, rng)?;
      output.push(Value::Array(encoded));
      disclosures.append(&mut child_disclosures);
    }
    scalar => output.push(scalar),
  }
  Ok(())
}

/// Transforms a JSON object into an SD-JWT object by substituting selected
/// values with the digest of their disclosure, one path at a time.
///
/// This is the lower-level sibling of [`encode`]: it does not walk a
/// [`crate::DisclosureStructure`] on its own, it performs exactly the
/// conceal operation it's told to, leaving the caller in control of
/// ordering and of which decoys to add where.
pub struct SdObjectEncoder<H: Hasher = Sha256Hasher> {
  object: Map<String, Value>,
  salt_length: usize,
  hasher: H,
}

impl SdObjectEncoder {
  /// Creates a new [`SdObjectEncoder`] with the `sha-256` hash function
  /// from a JSON-object string.
  pub fn new(object: &str) -> Result<SdObjectEncoder<Sha256Hasher>> {
    Ok(SdObjectEncoder {
      object: serde_json::from_str(object).map_err(|e| Error::DeserializationError(e.to_string()))?,
      salt_length: DEFAULT_SALT_SIZE,
      hasher: Sha256Hasher::new(),
    })
  }
}

impl TryFrom<Value> for SdObjectEncoder {
  type Error = Error;

  fn try_from(value: Value) -> Result<Self> {
    match value {
      Value::Object(object) => Ok(SdObjectEncoder {
        object,
        salt_length: DEFAULT_SALT_SIZE,
        hasher: Sha256Hasher::new(),
      }),
      _ => Err(Error::DataTypeMismatch("expected object".to_owned())),
    }
  }
}

impl<H: Hasher> SdObjectEncoder<H> {
  /// Creates a new [`SdObjectEncoder`] with a custom hash function.
  pub fn with_custom_hasher(object: &str, hasher: H) -> Result<Self> {
    Ok(Self {
      object: serde_json::from_str(object).map_err(|e| Error::DeserializationError(e.to_string()))?,
      salt_length: DEFAULT_SALT_SIZE,
      hasher,
    })
  }

  /// Substitutes the value at `path` (e.g. `["claim", "subclaim"]`) with
  /// the digest of its disclosure. Use [`Self::conceal_array_entry`] for
  /// values inside arrays.
  ///
  /// ## Errors
  /// [`Error::InvalidPath`] if `path` is empty or doesn't resolve;
  /// [`Error::DataTypeMismatch`] if an existing `_sd` entry isn't an array.
  pub fn conceal(&mut self, path: &[&str], salt: Option<String>) -> Result<Disclosure> {
    if path.is_empty() {
      return Err(Error::InvalidPath("the provided path length is 0".to_string()));
    }
    let salt = salt.unwrap_or_else(|| Self::gen_rand(self.salt_length));
    let (target_key, parent_value) = Self::get_target_property_and_its_parent(&mut self.object, path)?;
    let disclosure = Disclosure::new(
      salt,
      Some(target_key.to_owned()),
      parent_value
        .remove(target_key)
        .ok_or_else(|| Error::InvalidPath(format!("{target_key} does not exist")))?,
    );
    let hash = disclosure.digest_with(&self.hasher);
    Self::add_digest_to_object(parent_value, hash)?;
    Ok(disclosure)
  }

  /// Substitutes the value at `path[element_index]` with the digest of its
  /// disclosure.
  ///
  /// ## Errors
  /// [`Error::IndexOutofBounds`] if `element_index` is out of bounds.
  pub fn conceal_array_entry(
    &mut self,
    path: &[&str],
    element_index: usize,
    salt: Option<String>,
  ) -> Result<Disclosure> {
    if path.is_empty() {
      return Err(Error::InvalidPath("the provided path length is 0".to_string()));
    }
    let salt = salt.unwrap_or_else(|| Self::gen_rand(self.salt_length));
    let (target_key, parent_value) = Self::get_target_property_and_its_parent(&mut self.object, path)?;
    let array = parent_value
      .get_mut(target_key)
      .ok_or_else(|| Error::InvalidPath(format!("{target_key} does not exist")))?
      .as_array_mut()
      .ok_or_else(|| Error::InvalidPath(format!("{target_key} is not an array")))?;

    if let Some(element_value) = array.get_mut(element_index) {
      let disclosure = Disclosure::new(salt, None, element_value.clone());
      let hash = disclosure.digest_with(&self.hasher);
      *element_value = json!({ ARRAY_DIGEST_KEY: hash });
      Ok(disclosure)
    } else {
      Err(Error::IndexOutofBounds(element_index))
    }
  }

  fn get_target_property_and_its_parent<'a, 'b>(
    json: &'a mut Map<String, Value>,
    path: &'b [&str],
  ) -> Result<(&'b str, &'a mut Map<String, Value>)> {
    let mut parent_value = json;
    let mut target_property = path[0];
    for index in 1..path.len() {
      match parent_value
        .get(target_property)
        .ok_or_else(|| Error::InvalidPath(format!("{target_property} does not exist")))?
      {
        Value::Object(_) => {
          parent_value = parent_value
            .get_mut(path[index - 1])
            .ok_or_else(|| Error::InvalidPath(format!("{} does not exist", path[index - 1])))?
            .as_object_mut()
            .ok_or_else(|| Error::InvalidPath(format!("{} is not an object", path[index - 1])))?;
          target_property = path[index];
        }
        _ => return Err(Error::InvalidPath(format!("{target_property} is not an object"))),
      }
    }
    Ok((target_property, parent_value))
  }

  /// Adds `_sd_alg` to the top level of the object.
  pub fn add_sd_alg_property(&mut self) -> Option<Value> {
    self
      .object
      .insert(SD_ALG_KEY.to_string(), Value::String(self.hasher.alg_name().to_string()))
  }

  /// Returns the modified object as a JSON string.
  pub fn try_to_string(&self) -> Result<String> {
    serde_json::to_string(&self.object)
      .map_err(|_e| Error::Unspecified("error while serializing internal object".to_string()))
  }

  /// Adds `number_of_decoys` decoy digests at `path` (the top level if
  /// `path` is empty).
  pub fn add_decoys(&mut self, path: &[&str], number_of_decoys: usize) -> Result<()> {
    for _ in 0..number_of_decoys {
      self.add_decoy(path)?;
    }
    Ok(())
  }

  fn add_decoy(&mut self, path: &[&str]) -> Result<Disclosure> {
    if path.is_empty() {
      let (disclosure, hash) = Self::random_digest(&self.hasher, self.salt_length, true);
      Self::add_digest_to_object(&mut self.object, hash)?;
      Ok(disclosure)
    } else {
      let (target_key, parent_value) = Self::get_target_property_and_its_parent(&mut self.object, path)?;
      let value = parent_value
        .get_mut(target_key)
        .ok_or_else(|| Error::InvalidPath(format!("{target_key} does not exist")))?;

      if let Some(object) = value.as_object_mut() {
        let (disclosure, hash) = Self::random_digest(&self.hasher, self.salt_length, true);
        Self::add_digest_to_object(object, hash)?;
        Ok(disclosure)
      } else if let Some(array) = value.as_array_mut() {
        let (disclosure, hash) = Self::random_digest(&self.hasher, self.salt_length, true);
        array.push(json!({ ARRAY_DIGEST_KEY: hash }));
        Ok(disclosure)
      } else {
        Err(Error::InvalidPath(format!("{target_key} is neither an object nor an array")))
      }
    }
  }

  fn add_digest_to_object(object: &mut Map<String, Value>, digest: String) -> Result<()> {
    if let Some(sd_value) = object.get_mut(DIGESTS_KEY) {
      if let Value::Array(value) = sd_value {
        value.push(Value::String(digest));
      } else {
        return Err(Error::DataTypeMismatch(
          "invalid object: existing `_sd` type is not an array".to_string(),
        ));
      }
    } else {
      object.insert(DIGESTS_KEY.to_owned(), Value::Array(vec![Value::String(digest)]));
    }
    Ok(())
  }

  fn random_digest(hasher: &dyn Hasher, salt_len: usize, array_entry: bool) -> (Disclosure, String) {
    let mut rng = rand::thread_rng();
    let salt = Self::gen_rand(salt_len);
    let decoy_value_length = rng.gen_range(20..=100);
    let decoy_claim_name = if array_entry {
      None
    } else {
      let decoy_claim_name_length = rng.gen_range(4..=10);
      Some(Self::gen_rand(decoy_claim_name_length))
    };
    let decoy_value = Self::gen_rand(decoy_value_length);
    let disclosure = Disclosure::new(salt, decoy_claim_name, Value::String(decoy_value));
    let hash = disclosure.digest_with(hasher);
    (disclosure, hash)
  }

  fn gen_rand(len: usize) -> String {
    rand::distributions::Alphanumeric.sample_string(&mut rand::thread_rng(), len)
  }

  /// Returns a reference to the internal object.
  pub fn object(&self) -> &Map<String, Value> {
    &self.object
  }

  /// Returns a mutable reference to the internal object.
  pub fn object_mut(&mut self) -> &mut Map<String, Value> {
    &mut self.object
  }

  /// Returns the salt length used for newly created disclosures.
  pub fn salt_length(&self) -> usize {
    self.salt_length
  }

  /// Sets the salt length used for newly created disclosures. A value of 0
  /// is ignored.
  pub fn set_salt_length(&mut self, salt_length: usize) {
    if salt_length > 0 {
      self.salt_length = salt_length;
    }
  }
}
