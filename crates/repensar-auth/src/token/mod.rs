//! Token issuance, verification and rotation primitives.

pub mod jwt;
pub mod service;

pub use jwt::{Claims, JwtService, SigningAlgorithm, generate_family, generate_jti};
pub use service::{IssuedToken, TokenData, TokenService};

use sha2::{Digest, Sha256};

/// Hashes a refresh token for at-rest storage.
///
/// Only the SHA-256 hex digest is persisted on the user record, so a
/// leaked database cannot replay sessions. Comparison against the
/// stored value is hash-to-hash.
#[must_use]
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
