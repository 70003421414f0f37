//! Token metadata record.
//!
//! One [`TokenRecord`] is written for every issued access or refresh
//! token. Records stay queryable until the token's natural expiry so that
//! revocation checks and reuse detection keep working; they are pruned
//! only after `expires_at` has passed.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Kind of issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived bearer credential; never rotated, carries no family.
    Access,
    /// Long-lived rotation credential; single-use, member of a family.
    Refresh,
}

impl TokenKind {
    /// Returns the kind as used in the token `type` claim.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Revocation status of a tracked token.
///
/// `Expired` is inferred lazily from `expires_at` and never written as a
/// transition; the other states are explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// The token is usable.
    Active,
    /// Explicitly revoked (logout, rotation, password change).
    Revoked,
    /// Past its `expires_at` timestamp.
    Expired,
    /// Revoked as part of a family-wide compromise response.
    Compromised,
}

impl TokenStatus {
    /// Returns the status as a lowercase string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::Compromised => "compromised",
        }
    }
}

/// Metadata for one issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Unique token identifier (the `jti` claim). Unguessable.
    pub jti: String,

    /// User the token was issued for.
    pub subject: Uuid,

    /// Rotation family shared by a refresh token and its successors.
    /// Access tokens carry no family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    /// Access or refresh.
    pub kind: TokenKind,

    /// When the token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When the token expires. Comparison is inclusive-exclusive:
    /// `now >= expires_at` means expired.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// IP the token was issued from. Provenance only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_from_ip: Option<String>,

    /// User agent the token was issued to. Provenance only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Current status.
    pub status: TokenStatus,
}

impl TokenRecord {
    /// Returns `true` if the token's natural lifetime has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the token is expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the token has been revoked or compromised.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        matches!(self.status, TokenStatus::Revoked | TokenStatus::Compromised)
    }

    /// Returns the effective status, folding in lazy expiry.
    #[must_use]
    pub fn effective_status(&self) -> TokenStatus {
        if self.is_revoked() {
            self.status
        } else if self.is_expired() {
            TokenStatus::Expired
        } else {
            self.status
        }
    }
}
