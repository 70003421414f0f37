//! User aggregate with security state.
//!
//! The user record itself is owned by the embedding application's user
//! repository; this core only reads credentials and mutates the security
//! fields (`failed_login_attempts`, `locked_until`, refresh-token state).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A user in the authentication system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// Email address used as the login identifier.
    pub email: String,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argon2id-hashed password.
    ///
    /// Never expose this field through an API surface.
    pub password_hash: String,

    /// Whether the account is active. Inactive users cannot authenticate.
    pub active: bool,

    /// Consecutive failed login attempts since the last success.
    pub failed_login_attempts: u32,

    /// Account lockout expiry. A future timestamp means locked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub locked_until: Option<OffsetDateTime>,

    /// SHA-256 hash of the single currently-valid refresh token.
    ///
    /// One live session per user: each login or rotation replaces this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_hash: Option<String>,

    /// Expiry of the stored refresh token.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub refresh_token_expires_at: Option<OffsetDateTime>,

    /// Rotation family of the current session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_family: Option<String>,

    /// When the user last logged in successfully.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_login: Option<OffsetDateTime>,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Creates a new active user with the given email and password hash.
    #[must_use]
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            name: None,
            password_hash: password_hash.into(),
            active: true,
            failed_login_attempts: 0,
            locked_until: None,
            refresh_token_hash: None,
            refresh_token_expires_at: None,
            token_family: None,
            last_login: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` if the account is currently locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.is_locked_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the account is locked as of `now`.
    #[must_use]
    pub fn is_locked_at(&self, now: OffsetDateTime) -> bool {
        self.locked_until.map(|until| now < until).unwrap_or(false)
    }

    /// Returns `true` if the account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("volunteer@example.org", "$argon2id$fake");
        assert!(user.active);
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.locked_until.is_none());
        assert!(user.refresh_token_hash.is_none());
        assert!(user.token_family.is_none());
    }

    #[test]
    fn test_is_locked() {
        let now = OffsetDateTime::now_utc();
        let mut user = User::new("a@b.c", "hash");
        assert!(!user.is_locked_at(now));

        user.locked_until = Some(now + Duration::minutes(30));
        assert!(user.is_locked_at(now));

        // Lockout in the past no longer locks.
        user.locked_until = Some(now - Duration::seconds(1));
        assert!(!user.is_locked_at(now));
    }

    #[test]
    fn test_serialization_field_names() {
        // Pins the serde field names storage backends depend on.
        let user = User::new("a@b.c", "hash");
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("password_hash"));
        assert!(json.contains("failed_login_attempts"));
        assert!(!json.contains("locked_until"));
    }
}
