//! Provider authentication tokens
//!
//! APNs accepts a short-lived ES256 JWT in place of a client certificate. The
//! [`TokenProvider`] signs one with the team's `.p8` key, caches it, and signs
//! a replacement once the cached token is 55 minutes old, five minutes ahead
//! of the one-hour limit APNs enforces.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::errors::{ApnsError, ApnsResult};

/// How long APNs honours a provider token
pub const TOKEN_LIFETIME_SECS: i64 = 60 * 60;

/// How long before expiry the cached token is replaced
pub const TOKEN_RENEWAL_MARGIN_SECS: i64 = 5 * 60;

/// Source of wall-clock time in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: i64,
}

struct CachedToken {
    token: String,
    issued_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        now - self.issued_at <= TOKEN_LIFETIME_SECS - TOKEN_RENEWAL_MARGIN_SECS
    }
}

/// Signs and caches the provider token for one client
pub struct TokenProvider {
    team_id: String,
    key_id: String,
    encoding_key: EncodingKey,
    clock: Arc<dyn Clock>,
    // Held across the freshness check and signing so renewal is single-flight.
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Create a provider from PEM-encoded PKCS#8 EC key material.
    ///
    /// The key is parsed here, once; a key that cannot be parsed is an
    /// [`ApnsError::Auth`] at construction rather than at first send.
    pub fn new(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key_pem: &[u8],
    ) -> ApnsResult<Self> {
        let encoding_key = EncodingKey::from_ec_pem(private_key_pem)
            .map_err(|e| ApnsError::auth_with_source("failed to parse APNs private key", e))?;

        Ok(Self {
            team_id: team_id.into(),
            key_id: key_id.into(),
            encoding_key,
            clock: Arc::new(SystemClock),
            cache: Mutex::new(None),
        })
    }

    /// Create a provider from a `.p8` key file
    pub fn from_key_file(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> ApnsResult<Self> {
        let path = path.as_ref();
        let pem = std::fs::read(path)
            .map_err(|e| ApnsError::io_with_source(path, "read APNs private key", e))?;
        Self::new(team_id, key_id, &pem)
    }

    /// Replace the clock used for issuance times
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Return the cached token, signing a new one if it is missing or stale
    pub fn get_token(&self) -> ApnsResult<String> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(now)) {
            return Ok(cached.token.clone());
        }

        let token = self.sign(now)?;
        debug!(key_id = %self.key_id, issued_at = now, "Signed new APNs provider token");

        *cache = Some(CachedToken {
            token: token.clone(),
            issued_at: now,
        });
        Ok(token)
    }

    /// Drop the cached token so the next call signs a new one
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.take().is_some() {
            debug!(key_id = %self.key_id, "Discarded cached APNs provider token");
        }
    }

    fn sign(&self, issued_at: i64) -> ApnsResult<String> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        let claims = Claims {
            iss: &self.team_id,
            iat: issued_at,
        };

        Ok(encode(&header, &claims, &self.encoding_key)?)
    }
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("team_id", &self.team_id)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}
