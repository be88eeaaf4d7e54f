//! Key resolution for token verification.
//!
//! [`KeyResolver`] is the seam between the authenticator and wherever public
//! keys come from. [`JwksClient`] fetches a JSON Web Key Set from the
//! identity provider and caches it with a TTL.
//!
//! # Security
//!
//! - Keys are cached to bound latency and outbound calls
//! - Concurrent cache misses share one fetch, whether it succeeds or fails
//! - An unknown `kid` refetches at most once per `min_refresh_interval`, so
//!   hostile key ids cannot drive traffic to the key source
//! - Each call makes at most one fetch attempt; there are no retries

use crate::errors::KeyUnavailable;
use crate::observability::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for RS256 keys).
    pub kty: String,

    /// Key ID. Keys published without one cannot be selected and are dropped.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key use ("sig" for signing), if declared.
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

impl JwksResponse {
    fn into_key_map(self) -> HashMap<String, Jwk> {
        self.keys
            .into_iter()
            .filter_map(|key| match key.kid.clone() {
                Some(kid) if !kid.is_empty() => Some((kid, key)),
                _ => None,
            })
            .collect()
    }
}

/// Maps a key identifier to the public key that verifies it.
///
/// Callers must not pass an empty `kid`.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, kid: &str) -> Result<Jwk, KeyUnavailable>;
}

/// Resolver over a fixed set of keys.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<String, Jwk>,
}

impl StaticKeyResolver {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self {
            keys: JwksResponse { keys }.into_key_map(),
        }
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, kid: &str) -> Result<Jwk, KeyUnavailable> {
        self.keys.get(kid).cloned().ok_or(KeyUnavailable)
    }
}

/// Cached JWKS data.
struct CachedJwks {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
    expires_at: Instant,
}

/// JWKS client for fetching and caching public keys.
pub struct JwksClient {
    jwks_url: String,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
    /// Serializes fetches so concurrent misses coalesce. Holds the time the
    /// last failed fetch finished, cleared on success.
    refresh_lock: Mutex<Option<Instant>>,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
}

/// What the fast path saw in the cache.
enum CacheLookup {
    Hit(Jwk),
    /// Fresh cache without the key, refetch not yet allowed.
    Miss,
    /// Needs a fetch; carries the generation observed, if any.
    Stale(Option<Instant>),
}

impl JwksClient {
    /// Create a new JWKS client.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL to the identity provider's JWKS endpoint
    /// * `cache_ttl` - How long to serve a fetched key set
    /// * `fetch_timeout` - Request timeout for one fetch
    /// * `min_refresh_interval` - Minimum spacing of unknown-`kid` refetches
    pub fn new(
        jwks_url: String,
        cache_ttl: Duration,
        fetch_timeout: Duration,
        min_refresh_interval: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "device_auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            cache_ttl,
            min_refresh_interval,
        }
    }

    /// Get a JWK by key ID, fetching the key set on a miss.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, KeyUnavailable> {
        let observed = match self.lookup(kid).await {
            CacheLookup::Hit(key) => {
                tracing::debug!(target: "device_auth.jwks", "JWKS cache hit");
                return Ok(key);
            }
            CacheLookup::Miss => {
                tracing::debug!(target: "device_auth.jwks", "Key not found in JWKS cache");
                return Err(KeyUnavailable);
            }
            CacheLookup::Stale(observed) => observed,
        };

        let waiting_since = Instant::now();
        let mut last_failure = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if Some(cached.fetched_at) != observed && cached.expires_at > Instant::now() {
                    return cached.keys.get(kid).cloned().ok_or_else(|| {
                        tracing::debug!(target: "device_auth.jwks", "Key not found in JWKS after concurrent refresh");
                        KeyUnavailable
                    });
                }
            }
        }

        // A fetch failed while we waited; share its outcome.
        if matches!(*last_failure, Some(failed_at) if failed_at >= waiting_since) {
            tracing::debug!(target: "device_auth.jwks", "JWKS fetch failed while waiting, not refetching");
            return Err(KeyUnavailable);
        }

        let keys = match self.fetch().await {
            Ok(keys) => {
                *last_failure = None;
                keys
            }
            Err(e) => {
                *last_failure = Some(Instant::now());
                return Err(e);
            }
        };
        let found = keys.get(kid).cloned();

        let now = Instant::now();
        *self.cache.write().await = Some(CachedJwks {
            keys,
            fetched_at: now,
            expires_at: now + self.cache_ttl,
        });

        found.ok_or_else(|| {
            tracing::warn!(target: "device_auth.jwks", "Key not found in JWKS after refresh");
            KeyUnavailable
        })
    }

    async fn lookup(&self, kid: &str) -> CacheLookup {
        let cache = self.cache.read().await;
        let Some(cached) = cache.as_ref() else {
            return CacheLookup::Stale(None);
        };

        let now = Instant::now();
        if cached.expires_at <= now {
            return CacheLookup::Stale(Some(cached.fetched_at));
        }

        if let Some(key) = cached.keys.get(kid) {
            return CacheLookup::Hit(key.clone());
        }

        if now.duration_since(cached.fetched_at) >= self.min_refresh_interval {
            CacheLookup::Stale(Some(cached.fetched_at))
        } else {
            CacheLookup::Miss
        }
    }

    /// Fetch the key set once. Failures are logged here and collapse to
    /// `KeyUnavailable`.
    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<HashMap<String, Jwk>, KeyUnavailable> {
        tracing::debug!(target: "device_auth.jwks", url = %self.jwks_url, "Fetching JWKS");
        let start = Instant::now();

        let result = self.fetch_inner().await;
        metrics::record_jwks_fetch(
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );

        let keys = result?;
        tracing::info!(
            target: "device_auth.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );
        Ok(keys)
    }

    async fn fetch_inner(&self) -> Result<HashMap<String, Jwk>, KeyUnavailable> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "device_auth.jwks", error = %e, "Failed to fetch JWKS");
                KeyUnavailable
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "device_auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(KeyUnavailable);
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "device_auth.jwks", error = %e, "Failed to parse JWKS response");
            KeyUnavailable
        })?;

        Ok(jwks.into_key_map())
    }

    /// Drop the cached key set.
    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
    }
}

#[async_trait]
impl KeyResolver for JwksClient {
    async fn resolve(&self, kid: &str) -> Result<Jwk, KeyUnavailable> {
        self.get_key(kid).await
    }
}
