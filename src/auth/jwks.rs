//! JWKS fetching and caching
//!
//! The cache honours the key-rotation schedule the issuer advertises: the
//! TTL of a cached key set is taken from the `Cache-Control: max-age` of the
//! JWKS response, falling back to the configured default. A forced refresh
//! (unknown `kid`, signature failure) bypasses the TTL. Refreshes lock only
//! the entry being refreshed, so concurrent authentication against an
//! already-cached issuer is never blocked.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonwebtoken::jwk::JwkSet;
use tracing::debug;

use super::AuthError;

/// Cached JWKS entry
struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedJwks {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// JWKS cache, one entry per issuer.
pub struct JwksCache {
    inner: DashMap<String, CachedJwks>,
    http: reqwest::Client,
    /// TTL used when the issuer response carries no `Cache-Control: max-age`
    default_ttl: Duration,
}

impl JwksCache {
    /// Create with the given fallback TTL.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: DashMap::new(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            default_ttl,
        }
    }

    /// Return the cached JWKS for `issuer`, or fetch from `jwks_uri` if stale.
    ///
    /// If `force_refresh` is `true`, the cache is bypassed regardless of TTL.
    pub async fn get_or_fetch(
        &self,
        issuer: &str,
        jwks_uri: &str,
        force_refresh: bool,
    ) -> Result<JwkSet, AuthError> {
        if !force_refresh {
            if let Some(cached) = self.inner.get(issuer) {
                if !cached.is_stale() {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(issuer = %issuer, "Fetching JWKS from {jwks_uri}");
        crate::metrics::jwks_fetch(force_refresh);

        let response = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        let ttl = response
            .headers()
            .get(http::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(self.default_ttl);

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        self.inner.insert(
            issuer.to_string(),
            CachedJwks {
                keys: jwks.clone(),
                fetched_at: Instant::now(),
                ttl,
            },
        );

        Ok(jwks)
    }
}

/// Parse `max-age=<secs>` out of a `Cache-Control` header value.
fn parse_max_age(value: &str) -> Option<Duration> {
    value
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|secs| secs.parse::<u64>().ok())
        .map(Duration::from_secs)
}
