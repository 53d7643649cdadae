// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The disclosure-structure configuration consumed by the object encoder
//! (C5): a mirror of the input claim tree in which scalar object members
//! carry a disclosability boolean and array positions carry a
//! disclosability boolean or a nested structure for composite elements that
//! should be recursed into rather than concealed as a whole.

use std::collections::HashMap;

/// One node of a [`DisclosureStructure`].
#[derive(Debug, Clone)]
pub enum DisclosureNode {
  /// A scalar object member: `true` if it should become a disclosure.
  Leaf(bool),
  /// A nested object; its members are recursed into unconditionally, with
  /// each member's own disclosability decided by its entry here (absent
  /// entries default to "not disclosable").
  Object(HashMap<String, DisclosureNode>),
  /// A nested array; each position's entry decides whether that element
  /// becomes a whole-element disclosure or is recursed into.
  Array(Vec<ArrayElement>),
}

/// The disclosure configuration for one array position.
#[derive(Debug, Clone)]
pub enum ArrayElement {
  /// Conceal (`true`) or keep (`false`) this element as a single
  /// disclosure, regardless of whether it is a scalar or composite value.
  Conceal(bool),
  /// Do not conceal this element as a whole; if it is composite, recurse
  /// into it using the given structure.
  Nested(DisclosureNode),
}

/// The top-level disclosure-structure configuration: always an object,
/// mirroring the issuer payload.
pub type DisclosureStructure = HashMap<String, DisclosureNode>;

impl DisclosureNode {
  /// Convenience constructor for a disclosable scalar leaf.
  pub fn disclosable() -> Self {
    Self::Leaf(true)
  }

  /// Convenience constructor for a non-disclosable scalar leaf.
  pub fn hidden() -> Self {
    Self::Leaf(false)
  }
}
