//! # Notification Token Validation
//!
//! Validates the signed tokens that accompany change notification batches.
//! Tokens are RS256 JWTs; the signing key is selected by the `kid` header from
//! a remote, rotating JSON Web Key Set, cached in-process.
//!
//! Cached keys expire after an hour. Cache misses share a single refresh, and
//! the set is refetched at most once per refresh interval however many unknown
//! `kid`s arrive, so a hostile batch cannot fan out into key set requests.
//!
//! Callers only ever see a boolean: every failure (bad signature, expiry, wrong
//! issuer or audience, key set unreachable) is logged and folded into `false`.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use lru::LruCache;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::AppConfig;

const JWKS_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Minimum spacing between two key set fetches.
const JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Cached keys older than this are refetched before use.
const JWKS_MAX_KEY_AGE: Duration = Duration::from_secs(60 * 60);

/// Allowed clock skew when checking `exp`/`nbf`, in seconds.
const CLOCK_SKEW_LEEWAY_SECS: u64 = 60;

/// Reasons a token was rejected. Internal to this module; logged, never returned.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token header: {0}")]
    MalformedHeader(String),

    #[error("token header has no 'kid'")]
    MissingKeyId,

    #[error("key '{0}' not found in key set")]
    UnknownKey(String),

    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("key set fetch failed: {0}")]
    JwksFetch(String),

    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
}

/// JSON Web Key Set document
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JsonWebKey>,
}

/// JSON Web Key for JWT signature verification
#[derive(Debug, Deserialize, Clone)]
struct JsonWebKey {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedKey {
    jwk: JsonWebKey,
    fetched_at: Instant,
}

/// Something that can decide whether a notification token is trustworthy.
#[async_trait]
pub trait TokenValidation: Send + Sync {
    async fn is_valid(&self, token: &str) -> bool;
}

/// Validates tokens against a remote key set, an audience and a fixed set of issuers.
pub struct TokenValidator {
    http_client: Client,
    jwks_url: String,
    jwks_cache: Arc<RwLock<LruCache<String, CachedKey>>>,
    /// Held for the duration of a refresh; records when the last one started.
    last_refresh: Arc<Mutex<Option<Instant>>>,
    min_refresh_interval: Duration,
    max_key_age: Duration,
    audience: String,
    issuers: Vec<String>,
}

impl TokenValidator {
    pub fn new(
        http_client: Client,
        jwks_url: String,
        audience: String,
        issuers: Vec<String>,
    ) -> Self {
        Self {
            http_client,
            jwks_url,
            jwks_cache: Arc::new(RwLock::new(LruCache::new(JWKS_CACHE_CAPACITY))),
            last_refresh: Arc::new(Mutex::new(None)),
            min_refresh_interval: JWKS_MIN_REFRESH_INTERVAL,
            max_key_age: JWKS_MAX_KEY_AGE,
            audience,
            issuers,
        }
    }

    /// Audience is the application's client id; issuers are the tenant's two issuer URLs.
    pub fn from_config(config: &AppConfig, http_client: Client) -> Self {
        Self::new(
            http_client,
            config.jwks_url.clone(),
            config.client_id.clone(),
            config.accepted_issuers(),
        )
    }

    /// Override how often the key set may be refetched and how long keys stay cached.
    pub fn with_refresh_policy(
        mut self,
        min_refresh_interval: Duration,
        max_key_age: Duration,
    ) -> Self {
        self.min_refresh_interval = min_refresh_interval;
        self.max_key_age = max_key_age;
        self
    }

    /// Verify signature, expiry, audience and issuer of a token.
    pub async fn verify(&self, token: &str) -> Result<(), TokenError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| TokenError::MalformedHeader(e.to_string()))?;

        let kid = header.kid.ok_or(TokenError::MissingKeyId)?;
        let jwk = self.get_verification_key(&kid).await?;
        let decoding_key = create_decoding_key(&jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&self.issuers);
        validation.validate_exp = true;
        validation.leeway = CLOCK_SKEW_LEEWAY_SECS;

        decode::<serde_json::Value>(token, &decoding_key, &validation)?;

        Ok(())
    }

    /// Get verification key by kid, refreshing the key set when it is not cached.
    async fn get_verification_key(&self, kid: &str) -> Result<JsonWebKey, TokenError> {
        if let Some(jwk) = self.cached_key(kid).await {
            return Ok(jwk);
        }

        let mut last_refresh = self.last_refresh.lock().await;

        // Another miss may have refreshed the set while this one waited.
        if let Some(jwk) = self.cached_key(kid).await {
            return Ok(jwk);
        }
        if let Some(started) = *last_refresh
            && started.elapsed() < self.min_refresh_interval
        {
            debug!(kid, "Key set refreshed recently; not refetching");
            return Err(TokenError::UnknownKey(kid.to_string()));
        }

        *last_refresh = Some(Instant::now());
        let jwks = self.fetch_jwks().await?;
        let fetched_at = Instant::now();

        let mut found = None;
        let mut cache = self.jwks_cache.write().await;
        // Keys dropped from the remote set must stop validating.
        cache.clear();
        for key in jwks.keys {
            let Some(key_id) = key.kid.clone() else {
                continue;
            };
            if key_id == kid {
                found = Some(key.clone());
            }
            cache.put(key_id, CachedKey { jwk: key, fetched_at });
        }
        debug!(keys = cache.len(), "Key set refreshed");

        found.ok_or_else(|| TokenError::UnknownKey(kid.to_string()))
    }

    async fn cached_key(&self, kid: &str) -> Option<JsonWebKey> {
        let mut cache = self.jwks_cache.write().await;
        match cache.get(kid) {
            Some(entry) if entry.fetched_at.elapsed() < self.max_key_age => {
                Some(entry.jwk.clone())
            }
            _ => None,
        }
    }

    async fn fetch_jwks(&self) -> Result<JwksResponse, TokenError> {
        debug!(jwks_url = %self.jwks_url, "Fetching signing key set");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| TokenError::JwksFetch(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TokenError::JwksFetch(format!(
                "key set request failed with status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| TokenError::JwksFetch(format!("failed to parse key set: {}", e)))
    }
}

fn create_decoding_key(jwk: &JsonWebKey) -> Result<DecodingKey, TokenError> {
    if jwk.kty != "RSA" {
        return Err(TokenError::UnsupportedKey(format!(
            "key type '{}' is not RSA",
            jwk.kty
        )));
    }

    let n = jwk
        .n
        .as_ref()
        .ok_or_else(|| TokenError::UnsupportedKey("missing 'n' (modulus)".to_string()))?;
    let e = jwk
        .e
        .as_ref()
        .ok_or_else(|| TokenError::UnsupportedKey("missing 'e' (exponent)".to_string()))?;

    DecodingKey::from_rsa_components(n, e).map_err(TokenError::Rejected)
}

#[async_trait]
impl TokenValidation for TokenValidator {
    async fn is_valid(&self, token: &str) -> bool {
        match self.verify(token).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Notification validation token rejected");
                false
            }
        }
    }
}

/// Validate every token concurrently; the batch is trusted only if all pass.
///
/// An empty token list is never trusted.
pub async fn validate_all(validator: &dyn TokenValidation, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return false;
    }

    let results = join_all(tokens.iter().map(|token| validator.is_valid(token))).await;
    results.into_iter().all(|valid| valid)
}
