//! User security-state storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::User;

/// Storage for user records and their mutable security state.
///
/// The embedding application owns user CRUD; this trait covers only the
/// lookups and security-field mutations the session core needs.
///
/// # Atomicity
///
/// `record_failed_login` must be an atomic increment (two concurrent
/// failures count as two), and `rotate_refresh_token` must be an atomic
/// compare-and-swap: of two concurrent rotations presenting the same
/// current hash, exactly one succeeds. The in-memory backend uses a
/// single lock; a database backend would use `UPDATE ... WHERE`
/// returning the affected row count.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Looks up a user by email (the login identifier).
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    /// Looks up a user by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    /// Atomically increments the failed-login counter, returning the
    /// new count.
    async fn record_failed_login(&self, id: Uuid) -> Result<u32, AuthError>;

    /// Locks the account until `until`.
    async fn lock_until(&self, id: Uuid, until: OffsetDateTime) -> Result<(), AuthError>;

    /// Clears failure count and lockout and stamps `last_login`.
    /// Called on successful authentication.
    async fn reset_login_state(&self, id: Uuid, now: OffsetDateTime) -> Result<(), AuthError>;

    /// Installs a new refresh-token hash, expiry and family, replacing
    /// whatever session state was there before.
    async fn set_refresh_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
        family: &str,
    ) -> Result<(), AuthError>;

    /// Clears all stored refresh-token state (hash, expiry, family).
    async fn clear_refresh_token(&self, id: Uuid) -> Result<(), AuthError>;

    /// Atomically swaps the stored refresh-token hash from
    /// `expected_hash` to `new_hash`, updating the expiry.
    ///
    /// Returns `true` if the swap happened. Returns `false` when the
    /// stored hash does not equal `expected_hash` (the token was
    /// already rotated, cleared, or replaced) without modifying
    /// anything; the caller treats that as token reuse.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<bool, AuthError>;

    /// Replaces the stored password hash.
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AuthError>;
}
