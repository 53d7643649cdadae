// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// The result type returned by this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode the core can surface, grouped per the structural /
/// cryptographic / selective-disclosure-protocol / VC-trust / collaborator
/// taxonomy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
  // --- structural ---
  /// Base64url decoding failed: non-alphabet character, or wrong length
  /// modulo 4 once padding is stripped.
  #[error("malformed base64url encoding: {0}")]
  MalformedEncoding(String),
  /// The compact or JSON-serialized presentation string did not match the
  /// expected `<JWS>~<D>~...~[<KB-JWT>]` shape.
  #[error("malformed presentation: {0}")]
  MalformedPresentation(String),
  /// An authored claim name collided with `_sd`, `_sd_alg`, or `...`.
  #[error("claim tree uses a reserved key: {0}")]
  ReservedKey(String),
  /// A digest or signature algorithm identifier is not known to the
  /// registry.
  #[error("unsupported algorithm: {0}")]
  UnsupportedAlgorithm(String),
  /// A digest or signature algorithm was recognized but excluded by the
  /// allow-list (e.g. `sha-1`, `md5`).
  #[error("algorithm disallowed by policy: {0}")]
  AlgorithmDisallowed(String),
  /// The parsed header or payload declared a credential format other than
  /// the JSON-based SD-JWT this crate implements.
  #[error("unsupported credential format: {0}")]
  UnsupportedFormat(String),

  // --- cryptographic ---
  /// The JWS signature did not validate under the resolved issuer key.
  #[error("invalid signature: {0}")]
  InvalidSignature(String),
  /// The Key-Binding JWT failed signature, `sd_hash`, `nonce`, `aud`, or
  /// freshness validation.
  #[error("key binding failed: {0}")]
  KeyBindingFailed(String),
  /// A disclosure's computed digest did not match any digest placeholder
  /// in the payload tree (or matched the wrong one).
  #[error("digest mismatch for disclosure at index {index}")]
  DigestMismatch {
    /// Index of the offending disclosure within the presented list.
    index: usize,
  },

  // --- selective-disclosure protocol ---
  /// The same encoded disclosure string appeared more than once in a
  /// presentation.
  #[error("duplicate disclosure at index {index}")]
  DuplicateDisclosure {
    /// Index of the first repeated disclosure.
    index: usize,
  },
  /// A presented disclosure did not correspond to any digest in the
  /// payload tree once all digests had been matched.
  #[error("superfluous disclosure at index {index}")]
  SuperfluousDisclosure {
    /// Index of the unmatched disclosure.
    index: usize,
  },
  /// A claim required by the profile (e.g. `vct`) is absent from both the
  /// payload and the disclosed claims.
  #[error("missing required claim: {0}")]
  MissingRequiredClaim(&'static str),

  // --- VC / trust ---
  /// The credential's issuer identifier did not match the caller-supplied
  /// trusted issuer.
  #[error("untrusted issuer: {0}")]
  UntrustedIssuer(String),
  /// The status-list lookup reported the credential as revoked or
  /// suspended.
  #[error("credential is revoked")]
  Revoked,
  /// A status-list index was requested that falls outside the bit vector.
  #[error("status list index {index} is out of range (list has {len} bits)")]
  IndexOutOfRange {
    /// The requested bit index.
    index: usize,
    /// The status list's bit length.
    len: usize,
  },
  /// The status-list transport failed, timed out, or returned an
  /// unusable/expired credential.
  #[error("status list unavailable: {0}")]
  StatusListUnavailable(String),

  // --- collaborator ---
  /// The injected key-provider could not resolve a public key for the
  /// parsed header.
  #[error("could not resolve signing key: {0}")]
  UnresolvedKey(String),
  /// The injected JWS signer failed to produce a signature.
  #[error("signing failed: {0}")]
  SigningFailed(String),

  // --- data shape ---
  /// A JSON pointer path did not resolve to a concealable location.
  #[error("invalid path: {0}")]
  InvalidPath(String),
  /// An array index passed to `conceal_array_entry` was out of bounds.
  #[error("index {0} is out of bounds")]
  IndexOutofBounds(usize),
  /// The claim tree (or a disclosure payload) did not deserialize to the
  /// expected JSON shape.
  #[error("deserialization error: {0}")]
  DeserializationError(String),
  /// An operation expected an object or array but found a scalar, or vice
  /// versa.
  #[error("data type mismatch: {0}")]
  DataTypeMismatch(String),
  /// The hasher supplied to a presentation/verification operation doesn't
  /// match the `_sd_alg` recorded at issuance.
  #[error("invalid hasher: {0}")]
  InvalidHasher(String),
  /// A presentation was built without a required Key-Binding JWT.
  #[error("presentation requires a key binding JWT but none was provided")]
  MissingKeyBindingJwt,
  /// Catch-all for invariants that should be unreachable in correct use.
  #[error("{0}")]
  Unspecified(String),
}
