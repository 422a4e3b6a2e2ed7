//! Signed session tokens.
//!
//! Provides:
//! - `SessionClaims`: the payload carried by the `statping_auth` cookie
//! - `SessionKey`: per-start HMAC key that signs and verifies tokens
//! - Cookie builders for issuing and clearing the session

use std::fmt;
use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Utc;
use hkdf::Hkdf;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::Duration as TimeDuration;

use super::AuthError;
use crate::config::SESSION_COOKIE;

/// Decoded payload of a session token.
///
/// Only trusted once the signature has been verified by a `SessionKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Username the session was issued to
    pub sub: String,
    #[serde(default)]
    pub admin: bool,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(subject: &str, admin: bool, lifetime: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: subject.to_string(),
            admin,
            iat: now,
            exp: now.saturating_add(lifetime_secs(lifetime)),
        }
    }

    /// Check the claim's time window against `now` (Unix seconds).
    pub fn validate(&self, now: i64) -> Result<(), AuthError> {
        if self.exp <= self.iat {
            return Err(AuthError::InvalidTimeWindow);
        }
        if now < self.iat {
            return Err(AuthError::NotYetValid);
        }
        if now >= self.exp {
            return Err(AuthError::Expired);
        }
        Ok(())
    }
}

/// HMAC-SHA256 key for session tokens.
///
/// A fresh key is generated every time the server starts, so tokens issued by
/// a previous process never verify.
#[derive(Clone)]
pub struct SessionKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    id: String,
}

impl SessionKey {
    /// Generate a key from fresh OS randomness.
    pub fn generate() -> Result<Self, AuthError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(|e| AuthError::Entropy(e.to_string()))?;
        Ok(Self::derive(&seed))
    }

    /// Derive a 64-byte signing key from an arbitrary-length secret using HKDF.
    pub fn derive(secret: &[u8]) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, secret);
        let mut key_bytes = [0u8; 64];
        hkdf.expand(b"statusd-session-token", &mut key_bytes)
            .expect("64 bytes is a valid length for HKDF-SHA256");

        let id = Sha256::digest(key_bytes)[..4]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();

        Self {
            encoding: EncodingKey::from_secret(&key_bytes),
            decoding: DecodingKey::from_secret(&key_bytes),
            id,
        }
    }

    /// Short fingerprint for logs. Not secret.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Issue a signed token for `subject`.
    pub fn issue(&self, subject: &str, admin: bool, lifetime: Duration) -> Result<String, AuthError> {
        self.sign(&SessionClaims::new(subject, admin, lifetime))
    }

    pub fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding,
        )?)
    }

    /// Verify signature and expiry, returning the trusted claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey").field("id", &self.id).finish()
    }
}

fn lifetime_secs(lifetime: Duration) -> i64 {
    i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX)
}

/// Build the session cookie for a freshly issued token.
pub fn session_cookie(token: String, lifetime: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::seconds(lifetime_secs(lifetime)))
        .build()
}

/// Build the cookie that clears the session.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}
