// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Selectively-disclosable JWTs (SD-JWT) and their Verifiable-Credential
//! profile.
//!
//! Three parties collaborate over signed, compact text artifacts: an
//! **issuer** mints a token where a chosen subset of claims are replaced by
//! digests (the cleartext travels alongside as *disclosures*); a **holder**
//! stores the issuance and later reveals a subset of disclosures, optionally
//! proving possession of a key via a Key-Binding JWT; a **verifier**
//! rehydrates the disclosed claims and validates the issuer signature,
//! digest bindings, key binding, and (for the VC profile) revocation
//! status.
//!
//! The crate does not implement a JWS signing/verification primitive
//! itself: callers inject a [`JwsSigner`]/[`JwsVerifier`] and a
//! [`KeyProvider`]. It also does not transport credentials or status lists:
//! callers inject a [`StatusListTransport`].

mod algorithms;
mod codec;
mod config;
mod decoder;
mod digest_builder;
mod disclosure;
mod encoder;
mod error;
mod hasher;
mod holder;
mod issuer;
pub mod jwt;
mod key_binding;
mod sd_jwt;
mod status_list;
mod structure;
mod vc;
mod verifier;

pub use algorithms::DigestAlgorithm;
pub use algorithms::SignatureAlgorithmRegistry;
pub use codec::b64url_decode;
pub use codec::b64url_encode;
pub use codec::canonical_json;
pub use codec::digest;
pub use codec::Digest;
pub use config::IssuanceConfig;
pub use config::VerificationConfig;
pub use decoder::SdObjectDecoder;
pub use digest_builder::decoy_count;
pub use digest_builder::DigestBuilder;
pub use disclosure::Disclosure;
pub use disclosure::DisclosureRng;
pub use encoder::SdObjectEncoder;
pub use error::Error;
pub use error::Result;
pub use hasher::hasher_for_alg_name;
pub use hasher::Hasher;
pub use hasher::Sha256Hasher;
pub use hasher::Sha384Hasher;
pub use hasher::Sha512Hasher;
pub use holder::Holder;
pub use issuer::Issuer;
pub use issuer::IssuanceBundle;
pub use issuer::JwsSigner;
pub use jwt::Jwt;
pub use key_binding::KeyBindingJwt;
pub use key_binding::KeyBindingJwtBuilder;
pub use key_binding::KeyBindingJwtClaims;
pub use key_binding::RequiredKeyBinding;
pub use sd_jwt::SdJwt;
pub use sd_jwt::SdJwtClaims;
pub use sd_jwt::SdJwtPresentationBuilder;
pub use status_list::StatusListCache;
pub use status_list::StatusListEngine;
pub use status_list::StatusListTransport;
pub use structure::ArrayElement;
pub use structure::DisclosureNode;
pub use structure::DisclosureStructure;
pub use vc::SdJwtVcClaims;
pub use vc::StatusRef;
pub use vc::VcVerificationResult;
pub use vc::VcVerifier;
pub use status_list::CancellationToken;
pub use status_list::NeverCancel;
pub use verifier::JwsVerifier;
pub use verifier::KeyProvider;
pub use verifier::Verifier;
pub use verifier::VerificationResult;

/// A JSON object: the representation used throughout for claim maps and
/// JOSE headers.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// The key under which an object's disclosure digests are listed.
pub const DIGESTS_KEY: &str = "_sd";
/// The key naming the digest algorithm used for an issuer payload's
/// digests; only ever present at the top level.
pub const SD_ALG_KEY: &str = "_sd_alg";
/// The key marking an array element as a disclosure placeholder.
pub const ARRAY_DIGEST_KEY: &str = "...";
/// Default digest algorithm name, used when a payload omits `_sd_alg`.
pub const SHA_ALG_NAME: &str = "sha-256";

/// Claim names that are never selectively disclosable at the top level of
/// an issuer payload.
pub const RETAINED_TOP_LEVEL_CLAIMS: &[&str] = &["iss", "iat", "nbf", "exp", "cnf", "vct", "type", "status"];

/// Fails with [`Error::ReservedKey`] if `key` is `_sd`, `_sd_alg`, or `...`.
pub(crate) fn reject_reserved_key(key: &str) -> Result<()> {
  if matches!(key, DIGESTS_KEY | SD_ALG_KEY | ARRAY_DIGEST_KEY) {
    Err(Error::ReservedKey(key.to_string()))
  } else {
    Ok(())
  }
}
