//! Authentication error types.
//!
//! This module defines all error types that can occur during session
//! operations. The taxonomy is deliberately coarse on the credential and
//! token paths: callers must never be able to distinguish *which* check
//! failed (user enumeration / oracle prevention), while rate-limit and
//! lockout rejections carry their retry-after duration since that
//! information is needed by well-behaved clients.

use std::fmt;

/// Errors that can occur during authentication and session operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The supplied credentials are wrong or the user does not exist.
    ///
    /// Deliberately carries no detail: an unknown email and a wrong
    /// password must be indistinguishable to the caller.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The account is locked due to too many failed login attempts.
    #[error("Account locked, retry after {retry_after_seconds}s")]
    AccountLocked {
        /// Seconds until the lockout expires.
        retry_after_seconds: u64,
    },

    /// The account has been deactivated.
    #[error("Account inactive")]
    AccountInactive,

    /// The token is invalid: bad signature, expired, wrong type, or revoked.
    ///
    /// All token validation failures collapse into this single variant so
    /// the caller gets no oracle for which check failed.
    #[error("Invalid token")]
    InvalidToken,

    /// A previously rotated-out refresh token was presented again.
    ///
    /// Internal-only signal: it triggers family revocation and audit
    /// logging, then surfaces to the caller as [`AuthError::InvalidToken`]
    /// via [`AuthError::into_public`].
    #[error("Token reuse detected for family {family}")]
    TokenReuseDetected {
        /// The refresh-token family that was replayed.
        family: String,
    },

    /// The request exceeded a rate limit.
    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds until the caller may retry.
        retry_after_seconds: u64,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `AccountLocked` error.
    #[must_use]
    pub fn account_locked(retry_after_seconds: u64) -> Self {
        Self::AccountLocked {
            retry_after_seconds,
        }
    }

    /// Creates a new `TokenReuseDetected` error.
    #[must_use]
    pub fn token_reuse_detected(family: impl Into<String>) -> Self {
        Self::TokenReuseDetected {
            family: family.into(),
        }
    }

    /// Creates a new `RateLimited` error.
    #[must_use]
    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self::RateLimited {
            retry_after_seconds,
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Converts internal-only variants into their public equivalents.
    ///
    /// `TokenReuseDetected` carries the compromised family for internal
    /// handling; the external caller must only ever see `InvalidToken`.
    #[must_use]
    pub fn into_public(self) -> Self {
        match self {
            Self::TokenReuseDetected { .. } => Self::InvalidToken,
            other => other,
        }
    }

    /// Returns the retry-after duration in seconds, if this rejection
    /// carries one (rate limiting and account lockout).
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::AccountLocked {
                retry_after_seconds,
            }
            | Self::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::AccountLocked { .. }
                | Self::AccountInactive
                | Self::InvalidToken
                | Self::TokenReuseDetected { .. }
                | Self::RateLimited { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is a token-related error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::TokenReuseDetected { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredentials => ErrorCategory::Authentication,
            Self::AccountLocked { .. } => ErrorCategory::Lockout,
            Self::AccountInactive => ErrorCategory::Authentication,
            Self::InvalidToken => ErrorCategory::Token,
            Self::TokenReuseDetected { .. } => ErrorCategory::Token,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of authentication errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential verification errors.
    Authentication,
    /// Account lockout rejections.
    Lockout,
    /// Token validation errors.
    Token,
    /// Rate limit rejections.
    RateLimit,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Lockout => write!(f, "lockout"),
            Self::Token => write!(f, "token"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
