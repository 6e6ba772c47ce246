//! Secret handling helpers
//!
//! API key minting, constant-time comparison of shared secrets and a
//! zeroizing container for signing keys.

use rand::{Rng, distributions::Alphanumeric};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Prefix that makes tenant API keys recognisable in logs and configs.
pub const API_KEY_PREFIX: &str = "sk_";

const API_KEY_RANDOM_LEN: usize = 32;
const MIN_SIGNING_KEY_LEN: usize = 16;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signing key must be at least {MIN_SIGNING_KEY_LEN} bytes, got {0}")]
    SigningKeyTooShort(usize),
}

/// Secure wrapper for signing keys with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

impl ZeroizingKey {
    pub fn new(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_SIGNING_KEY_LEN {
            return Err(CryptoError::SigningKeyTooShort(bytes.len()));
        }
        Ok(ZeroizingKey(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for ZeroizingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ZeroizingKey([REDACTED])")
    }
}

/// Mint a new tenant API key: `sk_` followed by 32 alphanumeric characters.
pub fn generate_api_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{API_KEY_PREFIX}{random}")
}

/// Whether `candidate` has the shape of a key minted by [`generate_api_key`].
pub fn looks_like_api_key(candidate: &str) -> bool {
    candidate
        .strip_prefix(API_KEY_PREFIX)
        .is_some_and(|rest| {
            rest.len() == API_KEY_RANDOM_LEN && rest.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

/// Exact, constant-time comparison of a presented secret with the expected one.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    ConstantTimeEq::ct_eq(presented.as_bytes(), expected.as_bytes()).into()
}
