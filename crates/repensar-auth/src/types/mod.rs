//! Domain types for the session-security core.

pub mod token_record;
pub mod user;

pub use token_record::{TokenKind, TokenRecord, TokenStatus};
pub use user::User;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance of a request: issuing IP and user agent.
///
/// Recorded on token metadata and audit events for forensics only;
/// never used for authorization decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrigin {
    /// Client IP address, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Client user agent, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestOrigin {
    /// Creates an origin from an IP address.
    #[must_use]
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent: None,
        }
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Returns the IP as a rate-limit identifier, falling back to
    /// `"unknown"` so origin-less requests share one bucket instead of
    /// escaping rate limiting entirely.
    #[must_use]
    pub fn rate_limit_id(&self) -> &str {
        self.ip.as_deref().unwrap_or("unknown")
    }
}

/// Token pair returned to the client on login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Signed access token (bearer credential for protected calls).
    pub access_token: String,

    /// Signed refresh token (single-use, rotated on every refresh).
    pub refresh_token: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Identity resolved from a verified access token.
///
/// This is what protected domain endpoints receive as "current user".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// The authenticated user's id.
    pub user_id: Uuid,

    /// Email embedded in the token, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// The jti of the access token that proved this identity.
    pub token_id: String,
}
