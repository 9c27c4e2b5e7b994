//! Bearer-token validation.
//!
//! Tokens are RFC 7519 compact JWTs. Validation resolves the verification
//! key by the token's `kid` from a remote key-set endpoint, verifies the
//! signature, then checks issuer, audience, and the time window with a
//! configurable skew. Successful validations are memoised by raw token
//! string in a bounded cache.

use std::time::Duration;

use dashmap::DashMap;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TokenAuthConfig;

/// Signature algorithms accepted from the key set, matching common
/// provider defaults.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Cache entries above this count trigger an expiry prune on insertion.
const CACHE_PRUNE_THRESHOLD: usize = 1000;

/// Errors from token validation.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token does not declare a key id")]
    MissingKeyId,

    #[error("no key {0:?} in the key set")]
    UnknownKey(String),

    #[error("unsupported signature algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("no key-set endpoint configured")]
    NoKeySet,

    #[error("key-set fetch failed: {0}")]
    KeySet(String),

    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Claims actually read out of a validated token. Issuer, audience, and
/// the time window are checked by the decoder itself.
#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: Option<String>,
    exp: Option<i64>,
}

/// A successfully validated token.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub subject: Option<String>,
}

struct CachedToken {
    subject: Option<String>,
    expires_at: i64,
}

/// Validates bearer tokens against the remote key set.
pub struct TokenValidator {
    issuer: Option<String>,
    audiences: Vec<String>,
    jwks_uri: Option<String>,
    cache_ttl_secs: i64,
    leeway_secs: u64,
    http: reqwest::Client,
    keys: DashMap<String, Jwk>,
    refresh: tokio::sync::Mutex<()>,
    cache: DashMap<String, CachedToken>,
}

impl TokenValidator {
    pub fn new(config: &TokenAuthConfig) -> Self {
        info!(
            "farcall: bearer-token validator activated (issuer: {})",
            config.issuer_uri.as_deref().unwrap_or("<any>")
        );
        Self {
            issuer: config.issuer_uri.clone(),
            audiences: config.audiences.clone(),
            jwks_uri: config.jwks_uri.clone(),
            cache_ttl_secs: config.token_cache_ttl_secs as i64,
            leeway_secs: config.clock_skew_secs,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            keys: DashMap::new(),
            refresh: tokio::sync::Mutex::new(()),
            cache: DashMap::new(),
        }
    }

    /// Validate a compact token, consulting the memo cache first.
    pub async fn validate(&self, token: &str) -> Result<ValidatedToken, TokenError> {
        let now = chrono::Utc::now().timestamp();

        if let Some(hit) = self.cache.get(token) {
            if hit.expires_at > now {
                return Ok(ValidatedToken { subject: hit.subject.clone() });
            }
        }

        let header = decode_header(token).map_err(|err| TokenError::Malformed(err.to_string()))?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(TokenError::MissingKeyId)?;

        let jwk = self.key_for(&kid).await?;
        let key =
            DecodingKey::from_jwk(&jwk).map_err(|err| TokenError::KeySet(err.to_string()))?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        if self.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audiences);
        }

        let data = decode::<TokenClaims>(token, &key, &validation).map_err(|err| {
            warn!("farcall: token validation failed: {err}");
            TokenError::Invalid(err.to_string())
        })?;

        let claims = data.claims;
        self.remember(token, claims.sub.clone(), claims.exp, now);
        Ok(ValidatedToken { subject: claims.sub })
    }

    /// Memoise a validated token. Entries live until the token expires or
    /// the cache TTL passes, whichever comes first; crossing the size
    /// threshold prunes expired entries inline.
    pub(crate) fn remember(&self, token: &str, subject: Option<String>, exp: Option<i64>, now: i64) {
        let ttl_deadline = now + self.cache_ttl_secs;
        let expires_at = exp.map_or(ttl_deadline, |e| e.min(ttl_deadline));
        if self.cache.len() >= CACHE_PRUNE_THRESHOLD {
            self.cache.retain(|_, entry| entry.expires_at > now);
        }
        self.cache.insert(token.to_owned(), CachedToken { subject, expires_at });
    }

    /// Resolve a verification key by id, fetching the remote key set on a
    /// miss. The fetch is serialised so concurrent first-time validations
    /// of an unseen key id produce one request.
    async fn key_for(&self, kid: &str) -> Result<Jwk, TokenError> {
        if let Some(jwk) = self.keys.get(kid) {
            return Ok(jwk.value().clone());
        }
        let uri = self.jwks_uri.as_ref().ok_or(TokenError::NoKeySet)?;

        let _guard = self.refresh.lock().await;
        if let Some(jwk) = self.keys.get(kid) {
            return Ok(jwk.value().clone());
        }

        debug!("farcall: fetching key set from {uri}");
        let set: JwkSet = self
            .http
            .get(uri)
            .send()
            .await
            .and_then(|rsp| rsp.error_for_status())
            .map_err(|err| TokenError::KeySet(err.to_string()))?
            .json()
            .await
            .map_err(|err| TokenError::KeySet(err.to_string()))?;

        for jwk in set.keys {
            if let Some(id) = jwk.common.key_id.clone() {
                self.keys.insert(id, jwk);
            }
        }

        self.keys
            .get(kid)
            .map(|jwk| jwk.value().clone())
            .ok_or_else(|| TokenError::UnknownKey(kid.to_owned()))
    }

    /// Seed the key cache directly, bypassing the remote fetch. Useful for
    /// operators shipping a pinned key set.
    pub fn insert_key(&self, kid: impl Into<String>, jwk: Jwk) {
        self.keys.insert(kid.into(), jwk);
    }
}
