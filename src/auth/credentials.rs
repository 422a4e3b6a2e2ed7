//! Static credentials: the API secret and configured dashboard users.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use super::AuthError;
use crate::config::UserConfig;

/// Compare two byte strings without short-circuiting on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// True when `presented` equals the configured API secret.
///
/// An empty configured secret matches nothing.
pub fn matches_api_secret(configured: &str, presented: &str) -> bool {
    !configured.is_empty() && constant_time_eq(configured.as_bytes(), presented.as_bytes())
}

/// Credential carried by an Authorization header value.
///
/// Accepts `Bearer <secret>` (scheme case-insensitive) or the bare secret.
pub fn authorization_credential(value: &str) -> &str {
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => value,
    }
}

/// Default-parameter Argon2id hash that no password produces.
///
/// Verified against when the username is unknown, so a lookup miss costs the
/// same as a wrong password.
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c3RhdHVzZC1kdW1teS1zYWx0$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Verify a password against a user's Argon2 PHC hash.
pub fn verify_password(user: &UserConfig, password: &str) -> Result<bool, AuthError> {
    verify_phc(&user.password_hash, password)
        .ok_or_else(|| AuthError::PasswordHash(user.username.clone()))
}

/// Spend one verification on the dummy hash and discard the result.
pub fn verify_dummy(password: &str) {
    let _ = verify_phc(DUMMY_PASSWORD_HASH, password);
}

/// `None` when the PHC string does not parse.
fn verify_phc(phc: &str, password: &str) -> Option<bool> {
    let parsed = PasswordHash::new(phc).ok()?;
    Some(
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
    )
}

/// Hash a password into a PHC string suitable for `[[auth.users]]`.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::Entropy(e.to_string()))?;
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .to_string();
    Ok(phc)
}
