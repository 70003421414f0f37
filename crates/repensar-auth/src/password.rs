//! Password hashing and verification.
//!
//! Uses Argon2id (hybrid mode) with default parameters and a random salt
//! drawn from `OsRng`. Hashes are stored in PHC string format.
//!
//! # Example
//!
//! ```
//! use repensar_auth::password::{hash_password, verify_password};
//!
//! let hash = hash_password("correct horse battery staple").unwrap();
//! assert!(hash.starts_with("$argon2id$"));
//! assert!(verify_password("correct horse battery staple", &hash).unwrap());
//! assert!(!verify_password("wrong password", &hash).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::AuthError;

/// Hash a password for secure storage using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails (rare).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash.
///
/// Returns `Ok(true)` if the password matches, `Ok(false)` if it does not.
///
/// # Errors
///
/// Returns `AuthError::Internal` only if the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AuthError::internal(format!("malformed password hash: {e}")))?;
    let result = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);
    Ok(result.is_ok())
}
