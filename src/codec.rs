// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Base64url codec and canonical JSON encoding for disclosures.
//!
//! Disclosures are encoded positionally — `[salt, name?, value]` — rather
//! than as a JSON object, so "canonical" here means nothing more than
//! `serde_json`'s default compact array serialization: there is no key
//! ordering to normalize since the array has no keys.

use multibase::Base;
use serde_json::Value;

use crate::algorithms::DigestAlgorithm;
use crate::Error;
use crate::Result;

/// Encodes `bytes` as unpadded base64url text.
pub fn b64url_encode(bytes: impl AsRef<[u8]>) -> String {
  Base::Base64Url.encode(bytes)
}

/// Decodes unpadded-or-padded base64url text back to bytes.
///
/// ## Errors
/// [`Error::MalformedEncoding`] if `input` contains characters outside the
/// base64url alphabet, or if its length (after stripping `=` padding) is
/// not congruent with a valid base64 length modulo 4.
pub fn b64url_decode(input: &str) -> Result<Vec<u8>> {
  let trimmed = input.trim_end_matches('=');
  if trimmed.len() % 4 == 1 {
    return Err(Error::MalformedEncoding(format!(
      "invalid length {} for base64url input",
      trimmed.len()
    )));
  }
  Base::Base64Url
    .decode(trimmed)
    .map_err(|e| Error::MalformedEncoding(e.to_string()))
}

/// Serializes `value` the way a disclosure array must be serialized: compact
/// JSON, no inserted whitespace. `value` is expected to already be the
/// positional `[salt, name?, value]` array.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>> {
  serde_json::to_vec(value).map_err(|e| Error::DeserializationError(e.to_string()))
}

/// A digest: its raw bytes and the base64url text placed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
  /// Raw digest bytes.
  pub bytes: Vec<u8>,
  /// Base64url text of `bytes`.
  pub text: String,
}

/// Hashes `bytes` under `alg`.
///
/// ## Errors
/// [`Error::UnsupportedAlgorithm`] if `alg` is not a member of the digest
/// registry (callers obtain `alg` from [`DigestAlgorithm`], so this only
/// triggers for algorithms parsed from untrusted input).
pub fn digest(alg: DigestAlgorithm, bytes: &[u8]) -> Result<Digest> {
  let raw = alg.hash(bytes)?;
  let text = b64url_encode(&raw);
  Ok(Digest { bytes: raw, text })
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn round_trip() {
    let text = b64url_encode(b"hello world");
    assert_eq!(b64url_decode(&text).unwrap(), b"hello world");
  }

  #[test]
  fn accepts_padded_input() {
    // "f" base64url-encodes to "Zg" (no padding needed for this specific
    // length, so force padding manually to exercise the padded path).
    let padded = "Zg==";
    assert_eq!(b64url_decode(padded).unwrap(), b"f");
  }

  #[test]
  fn rejects_bad_length() {
    assert!(matches!(
      b64url_decode("abcde").unwrap_err(),
      Error::MalformedEncoding(_)
    ));
  }

  #[test]
  fn rejects_bad_alphabet() {
    assert!(matches!(
      b64url_decode("not base64!!").unwrap_err(),
      Error::MalformedEncoding(_)
    ));
  }
}
