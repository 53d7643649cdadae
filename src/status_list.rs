// Copyright 2020-2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The status-list engine (C10): fetches, validates, and caches bit-indexed
//! revocation lists, answering `is_revoked(uri, index)` for [`crate::VcVerifier`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::codec;
use crate::config::VerificationConfig;
use crate::jwt::Jwt;
use crate::verifier::JwsVerifier;
use crate::verifier::KeyProvider;
use crate::Error;
use crate::JsonObject;
use crate::Result;

/// A transport collaborator, injected so the core never links an HTTP
/// client. Returns the raw response body together with its content type
/// (expected `application/jwt` or `application/statuslist+jwt`).
#[async_trait]
pub trait StatusListTransport: Send + Sync {
  /// Fetches `uri`, respecting `deadline` and `cancel`.
  ///
  /// ## Errors
  /// Any error (including a deadline overrun) surfaces as
  /// [`crate::Error::StatusListUnavailable`].
  async fn get(&self, uri: &str, deadline: Duration, cancel: &dyn CancellationToken) -> anyhow::Result<(Vec<u8>, String)>;
}

/// A cooperative cancellation signal, checked at each suspension point in
/// [`StatusListEngine::is_revoked_cancellable`]. Kept crate-local rather than
/// depending on an async runtime's cancellation type, since the core itself
/// is runtime-agnostic.
pub trait CancellationToken: Send + Sync {
  /// Whether the caller has requested cancellation.
  fn is_cancelled(&self) -> bool;
}

/// A [`CancellationToken`] that never cancels, for callers with no
/// cancellation source of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl CancellationToken for NeverCancel {
  fn is_cancelled(&self) -> bool {
    false
  }
}

/// Claims carried by a Status-List credential's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusListClaims {
  /// Base64url-encoded packed bit string; bit `i` is 1 iff index `i` is
  /// revoked/suspended.
  sub: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  iss: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  iat: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  exp: Option<i64>,
  #[serde(flatten)]
  properties: JsonObject,
}

struct CacheEntry {
  bits: Arc<Vec<u8>>,
  expires_at: Instant,
}

/// A thread-safe `uri -> bit vector` cache with caller-configured TTL.
/// Reads return a clone of the shared `Arc`, never a reference into the
/// guarded map; writes only ever happen after a fetched list has fully
/// validated.
#[derive(Default)]
pub struct StatusListCache {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl StatusListCache {
  /// An empty cache.
  pub fn new() -> Self {
    Self::default()
  }

  fn get(&self, uri: &str) -> Option<Arc<Vec<u8>>> {
    let entries = self.entries.lock().expect("status list cache mutex poisoned");
    let entry = entries.get(uri)?;
    if entry.expires_at <= Instant::now() {
      return None;
    }
    Some(entry.bits.clone())
  }

  fn insert(&self, uri: String, bits: Vec<u8>, ttl: Duration) {
    let mut entries = self.entries.lock().expect("status list cache mutex poisoned");
    entries.insert(
      uri,
      CacheEntry {
        bits: Arc::new(bits),
        expires_at: Instant::now() + ttl,
      },
    );
  }
}

/// Fetches, validates, and caches status lists, injecting the same
/// [`KeyProvider`]/[`JwsVerifier`] collaborators a [`crate::VcVerifier`] uses
/// for the credential itself.
pub struct StatusListEngine<'a> {
  key_provider: &'a dyn KeyProvider,
  jws_verifier: &'a dyn JwsVerifier,
  transport: &'a dyn StatusListTransport,
  cache: StatusListCache,
  cache_ttl: Duration,
  deadline: Duration,
  clock_skew: Duration,
}

impl<'a> StatusListEngine<'a> {
  /// Builds an engine pulling `status_list_cache_ttl`/`status_list_deadline`/
  /// `clock_skew` from `config`.
  pub fn new(
    key_provider: &'a dyn KeyProvider,
    jws_verifier: &'a dyn JwsVerifier,
    transport: &'a dyn StatusListTransport,
    config: &VerificationConfig,
  ) -> Self {
    Self {
      key_provider,
      jws_verifier,
      transport,
      cache: StatusListCache::new(),
      cache_ttl: config.status_list_cache_ttl,
      deadline: config.status_list_deadline,
      clock_skew: config.clock_skew,
    }
  }

  /// Equivalent to [`Self::is_revoked_cancellable`] with [`NeverCancel`].
  pub async fn is_revoked(&self, uri: &str, index: u64) -> Result<bool> {
    self.is_revoked_cancellable(uri, index, &NeverCancel).await
  }

  /// Answers whether bit `index` of the list at `uri` is set, fetching and
  /// validating the list if it is not already cached (or has expired its
  /// TTL).
  ///
  /// ## Errors
  /// [`Error::IndexOutOfRange`] if `index` falls outside the list;
  /// [`Error::StatusListUnavailable`] if the transport, parsing, signature,
  /// or lifetime check fails.
  pub async fn is_revoked_cancellable(&self, uri: &str, index: u64, cancel: &dyn CancellationToken) -> Result<bool> {
    let bits = match self.cache.get(uri) {
      Some(bits) => bits,
      None => {
        if cancel.is_cancelled() {
          return Err(Error::StatusListUnavailable("cancelled".to_string()));
        }
        let bits = self.fetch_and_validate(uri, cancel).await?;
        if cancel.is_cancelled() {
          return Err(Error::StatusListUnavailable("cancelled".to_string()));
        }
        self.cache.insert(uri.to_string(), (*bits).clone(), self.cache_ttl);
        bits
      }
    };

    let len_bits = bits.len() * 8;
    let index = usize::try_from(index).map_err(|_| Error::IndexOutOfRange { index: usize::MAX, len: len_bits })?;
    if index >= len_bits {
      return Err(Error::IndexOutOfRange { index, len: len_bits });
    }
    let byte = bits[index / 8];
    Ok((byte >> (index % 8)) & 1 == 1)
  }

  async fn fetch_and_validate(&self, uri: &str, cancel: &dyn CancellationToken) -> Result<Arc<Vec<u8>>> {
    let (body, _content_type) = self
      .transport
      .get(uri, self.deadline, cancel)
      .await
      .map_err(|e| Error::StatusListUnavailable(e.to_string()))?;

    let jws_text = std::str::from_utf8(&body).map_err(|e| Error::StatusListUnavailable(e.to_string()))?;
    let jwt: Jwt<StatusListClaims> = jws_text
      .parse()
      .map_err(|e: Error| Error::StatusListUnavailable(e.to_string()))?;

    let payload_value = serde_json::to_value(&jwt.claims).map_err(|e| Error::StatusListUnavailable(e.to_string()))?;
    let payload = payload_value
      .as_object()
      .cloned()
      .ok_or_else(|| Error::StatusListUnavailable("status list payload did not serialize to a JSON object".to_string()))?;

    let key = self
      .key_provider
      .resolve(&jwt.header, Some(&payload))
      .await
      .map_err(|e| Error::StatusListUnavailable(e.to_string()))?;

    let signing_input = jwt.signing_input().map_err(|e| Error::StatusListUnavailable(e.to_string()))?;
    self
      .jws_verifier
      .verify(&jwt.header, &signing_input, &jwt.signature, &key)
      .await
      .map_err(|e| Error::StatusListUnavailable(e.to_string()))?;

    let now = now_unix();
    let skew = self.clock_skew.as_secs() as i64;
    if let Some(iat) = jwt.claims.iat {
      if iat > now + skew {
        return Err(Error::StatusListUnavailable("status list iat is in the future".to_string()));
      }
    }
    if let Some(exp) = jwt.claims.exp {
      if exp < now - skew {
        return Err(Error::StatusListUnavailable("status list has expired".to_string()));
      }
    }

    let bits = codec::b64url_decode(&jwt.claims.sub).map_err(|e| Error::StatusListUnavailable(e.to_string()))?;
    Ok(Arc::new(bits))
  }
}

fn now_unix() -> i64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs() as i64
}
