//! Token metadata storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::TokenRecord;

/// Storage for issued-token metadata.
///
/// Backs revocation checks and incident response. Records are keyed by
/// `jti` and indexed by rotation family and by subject.
///
/// # Atomicity
///
/// `revoke_family` and `revoke_all_for_subject` must be atomic with
/// respect to concurrent `put` and `is_revoked` calls: a reader must
/// never observe a family half-revoked. The in-memory backend gets this
/// from a single lock; a database backend would use one statement or a
/// transaction.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Stores a token record, replacing any record with the same `jti`.
    async fn put(&self, record: TokenRecord) -> Result<(), AuthError>;

    /// Fetches a token record by `jti`.
    async fn get(&self, jti: &str) -> Result<Option<TokenRecord>, AuthError>;

    /// Returns `true` if the token has been revoked or compromised.
    ///
    /// Unknown tokens are NOT revoked: a `jti` absent from the store
    /// (e.g. already pruned after expiry) returns `false`, and the
    /// signature/expiry checks remain the only gate for it.
    async fn is_revoked(&self, jti: &str) -> Result<bool, AuthError>;

    /// Revokes a single token. Idempotent: revoking an already-revoked
    /// or unknown token succeeds without effect and without error.
    /// A `Compromised` status is never downgraded to `Revoked`.
    async fn revoke(&self, jti: &str) -> Result<(), AuthError>;

    /// Marks every token in a rotation family as compromised.
    ///
    /// Returns the number of records whose status changed. Tokens
    /// outside the family, including the subject's other tokens, are
    /// untouched.
    async fn revoke_family(&self, family: &str) -> Result<u64, AuthError>;

    /// Revokes every live token belonging to a subject, across all
    /// kinds and families. Returns the number of records whose status
    /// changed.
    async fn revoke_all_for_subject(&self, subject: Uuid) -> Result<u64, AuthError>;

    /// Removes records whose `expires_at` is at or before `now`.
    ///
    /// Expired tokens already fail signature-level expiry checks, so
    /// dropping their records loses nothing. Returns the number of
    /// records removed.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> Result<u64, AuthError>;
}
