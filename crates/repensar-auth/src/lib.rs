//! Session-security core for the Repensar volunteer platform.
//!
//! This crate owns the credential and session lifecycle: password
//! verification, signed access/refresh token issuance, single-use
//! refresh rotation with family-based reuse detection, sliding-window
//! rate limiting, account lockout, and a structured security audit log.
//!
//! The embedding application provides storage (via the [`storage`]
//! traits) and an HTTP layer; this crate returns typed results the
//! boundary maps to status codes once.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use repensar_auth::config::AuthConfig;
//! use repensar_auth::password::hash_password;
//! use repensar_auth::session::SessionService;
//! use repensar_auth::storage::{InMemoryTokenStore, InMemoryUserStorage};
//! use repensar_auth::types::{RequestOrigin, User};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), repensar_auth::error::AuthError> {
//! let users = Arc::new(InMemoryUserStorage::new());
//! users.insert(User::new("ana@example.org", hash_password("hunter2 but longer")?));
//!
//! let mut config = AuthConfig::default();
//! config.signing.secret = "a-real-deployment-uses-a-random-secret!!".into();
//! let sessions = SessionService::new(config, users, Arc::new(InMemoryTokenStore::new()))?;
//!
//! let origin = RequestOrigin::from_ip("203.0.113.7");
//! let tokens = sessions.login("ana@example.org", "hunter2 but longer", &origin).await?;
//! let identity = sessions.authenticate(&tokens.access_token, &origin).await?;
//! assert_eq!(identity.email.as_deref(), Some("ana@example.org"));
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod password;
pub mod ratelimit;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

pub use config::AuthConfig;
pub use error::AuthError;
pub use session::SessionService;

/// Result alias used throughout the crate.
pub type AuthResult<T> = Result<T, AuthError>;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditEventType, AuditLog, AuditQuery, AuditSeverity};
    pub use crate::config::AuthConfig;
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::ratelimit::{RateLimitAction, RateLimitRule, RateLimiter};
    pub use crate::session::SessionService;
    pub use crate::storage::{
        InMemoryTokenStore, InMemoryUserStorage, TokenStore, UserStorage,
    };
    pub use crate::token::{TokenData, TokenService};
    pub use crate::types::{
        RequestOrigin, SessionTokens, TokenKind, TokenRecord, TokenStatus, User, UserIdentity,
    };
    pub use crate::AuthResult;
}
