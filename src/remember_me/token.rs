//! Persistent token record and the random/hash primitives behind it.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use super::error::RememberMeError;

/// Random bytes behind a series identifier.
pub const SERIES_BYTES: usize = 16;

/// Random bytes behind a token value (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// One remember-me grant as stored server-side.
///
/// Only the SHA-256 digest of the token is kept; the raw value lives in the
/// client cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistentToken {
    pub series: String,
    pub username: String,
    pub token_hash: Vec<u8>,
    pub last_used_unix: i64,
}

impl PersistentToken {
    #[must_use]
    pub fn new(series: String, username: String, token_hash: Vec<u8>, last_used_unix: i64) -> Self {
        Self {
            series,
            username,
            token_hash,
            last_used_unix,
        }
    }

    /// Constant-time check of a presented raw token against the stored digest.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        let presented_hash = hash_token(presented);
        presented_hash.as_slice().ct_eq(self.token_hash.as_slice()).into()
    }

    /// Whether the grant has been idle longer than `validity_seconds`.
    #[must_use]
    pub fn is_expired(&self, now_unix: i64, validity_seconds: i64) -> bool {
        self.last_used_unix.saturating_add(validity_seconds) < now_unix
    }
}

/// A freshly issued or rotated `series:token` pair handed back to the client.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    series: String,
    token: SecretString,
}

impl IssuedToken {
    #[must_use]
    pub fn new(series: String, token: SecretString) -> Self {
        Self { series, token }
    }

    #[must_use]
    pub fn series(&self) -> &str {
        &self.series
    }

    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Encoded cookie value for this pair.
    #[must_use]
    pub fn cookie_value(&self) -> String {
        super::cookie::encode_cookie_value(&self.series, self.token.expose_secret())
    }
}

fn random_value(len: usize) -> Result<String, RememberMeError> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(RememberMeError::TokenGeneration)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Create a new series identifier.
pub fn generate_series() -> Result<String, RememberMeError> {
    random_value(SERIES_BYTES)
}

/// Create a new raw token value.
pub fn generate_token() -> Result<SecretString, RememberMeError> {
    random_value(TOKEN_BYTES).map(SecretString::from)
}

/// Hash a raw token so it never touches the store.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Current time as unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_values_decode_to_expected_lengths() {
        let series = generate_series().unwrap();
        let token = generate_token().unwrap();
        assert_eq!(
            Base64UrlUnpadded::decode_vec(&series).map(|b| b.len()).ok(),
            Some(SERIES_BYTES)
        );
        assert_eq!(
            Base64UrlUnpadded::decode_vec(token.expose_secret())
                .map(|b| b.len())
                .ok(),
            Some(TOKEN_BYTES)
        );
    }

    #[test]
    fn generated_values_are_unique() {
        let first = generate_token().unwrap();
        let second = generate_token().unwrap();
        assert_ne!(first.expose_secret(), second.expose_secret());
        assert_ne!(generate_series().unwrap(), generate_series().unwrap());
    }

    #[test]
    fn hash_token_stable() {
        assert_eq!(hash_token("token"), hash_token("token"));
        assert_ne!(hash_token("token"), hash_token("other"));
        assert_eq!(hash_token("token").len(), 32);
    }

    #[test]
    fn matches_compares_against_digest() {
        let record = PersistentToken::new(
            "series".to_string(),
            "alice@example.com".to_string(),
            hash_token("secret"),
            0,
        );
        assert!(record.matches("secret"));
        assert!(!record.matches("Secret"));
        assert!(!record.matches(""));
    }

    #[test]
    fn expiry_is_relative_to_last_use() {
        let record = PersistentToken::new(
            "series".to_string(),
            "alice@example.com".to_string(),
            hash_token("secret"),
            1_000,
        );
        assert!(!record.is_expired(1_000, 60));
        assert!(!record.is_expired(1_060, 60));
        assert!(record.is_expired(1_061, 60));
    }

    #[test]
    fn now_unix_is_after_2020() {
        assert!(now_unix() > 1_577_836_800);
    }
}
