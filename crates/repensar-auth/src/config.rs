//! Session-security configuration.
//!
//! This module provides configuration types for the auth core: token
//! lifetimes, signing settings, account lockout thresholds, and the
//! per-action rate-limit rule table. Every field has a sane default and
//! can be overridden from the environment or a config file via `serde`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ratelimit::RateLimitRule;

/// Root configuration for the session-security core.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.signing]
/// secret = "change-me-to-a-long-random-value-xxxx"
/// algorithm = "HS256"
///
/// [auth.tokens]
/// access_token_lifetime = "30m"
/// refresh_token_lifetime = "30d"
///
/// [auth.lockout]
/// max_login_attempts = 5
/// lockout_duration = "30m"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Token lifetime configuration.
    pub tokens: TokenLifetimeConfig,

    /// Account lockout configuration.
    pub lockout: LockoutConfig,

    /// Rate limiting configuration.
    pub rate_limiting: RateLimitingConfig,

    /// Audit configuration.
    pub audit: AuditConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing: SigningConfig::default(),
            tokens: TokenLifetimeConfig::default(),
            lockout: LockoutConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Token signing configuration.
///
/// Tokens are signed with an HMAC keyed by a shared secret. The secret
/// must be long (>= 32 bytes) and random; the default value exists only
/// so development environments boot.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Shared HMAC secret. MUST be overridden in production.
    pub secret: String,

    /// Signing algorithm.
    /// Supported: "HS256", "HS384", "HS512"
    pub algorithm: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: "insecure-development-secret-change-me!!".to_string(),
            algorithm: "HS256".to_string(),
        }
    }
}

/// Token lifetime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenLifetimeConfig {
    /// Access token lifetime.
    /// Access tokens are short-lived and never rotated.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    /// Refresh tokens are long-lived and rotated on every use.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenLifetimeConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(30 * 60), // 30 minutes
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
        }
    }
}

/// Account lockout configuration.
///
/// This is the slower, account-scoped defense layered on top of the
/// fast, IP-scoped rate limiter: consecutive failed logins against one
/// account lock that account regardless of source IP.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failed logins before the account is locked.
    pub max_login_attempts: u32,

    /// How long the account stays locked.
    #[serde(with = "humantime_serde")]
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout_duration: Duration::from_secs(30 * 60), // 30 minutes
        }
    }
}

/// Rate limiting configuration.
///
/// Each protected action has its own rule and its own key namespace, so
/// exhausting one action's budget never affects another's.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Enable/disable rate limiting entirely.
    /// Intended for test environments only; defaults to enabled.
    pub enabled: bool,

    /// Login attempts per source IP.
    pub login: RateLimitRule,

    /// Registration attempts per source IP.
    pub register: RateLimitRule,

    /// Password reset requests per source IP.
    pub password_reset: RateLimitRule,

    /// Token refresh attempts per source IP.
    pub token_refresh: RateLimitRule,

    /// Email verification attempts per source IP.
    pub email_verification: RateLimitRule,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login: RateLimitRule::new(5, Duration::from_secs(300))
                .with_lockout(Duration::from_secs(900)),
            register: RateLimitRule::new(3, Duration::from_secs(3600)),
            password_reset: RateLimitRule::new(3, Duration::from_secs(3600)),
            token_refresh: RateLimitRule::new(10, Duration::from_secs(60)),
            email_verification: RateLimitRule::new(5, Duration::from_secs(3600)),
        }
    }
}

impl RateLimitingConfig {
    /// Returns the rule for a named action.
    #[must_use]
    pub fn rule_for(&self, action: crate::ratelimit::RateLimitAction) -> &RateLimitRule {
        use crate::ratelimit::RateLimitAction;
        match action {
            RateLimitAction::Login => &self.login,
            RateLimitAction::Register => &self.register,
            RateLimitAction::PasswordReset => &self.password_reset,
            RateLimitAction::TokenRefresh => &self.token_refresh,
            RateLimitAction::EmailVerification => &self.email_verification,
        }
    }

    /// Longest window across all rules. Attempt history older than this
    /// is dead weight for every action and safe to prune.
    #[must_use]
    pub fn longest_window(&self) -> Duration {
        [
            &self.login,
            &self.register,
            &self.password_reset,
            &self.token_refresh,
            &self.email_verification,
        ]
        .iter()
        .map(|rule| rule.window)
        .max()
        .unwrap_or(Duration::ZERO)
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Log successful authentication events.
    pub log_successful_auth: bool,

    /// Log failed authentication events.
    pub log_failed_auth: bool,

    /// Log token operations (issue, refresh, revoke).
    pub log_token_operations: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_successful_auth: true,
            log_failed_auth: true,
            log_token_operations: true,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The signing secret is empty or shorter than 32 bytes
    /// - The signing algorithm is not supported
    /// - `max_login_attempts` is zero
    /// - Any rate-limit rule has a zero attempt budget or window
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing.secret.is_empty() {
            return Err(ConfigError::Missing("signing.secret".to_string()));
        }

        if self.signing.secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "signing.secret must be at least 32 bytes".to_string(),
            ));
        }

        match self.signing.algorithm.as_str() {
            "HS256" | "HS384" | "HS512" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{other}'. Must be HS256, HS384, or HS512"
                )));
            }
        }

        if self.lockout.max_login_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "lockout.max_login_attempts must be > 0".to_string(),
            ));
        }

        for (name, rule) in [
            ("login", &self.rate_limiting.login),
            ("register", &self.rate_limiting.register),
            ("password_reset", &self.rate_limiting.password_reset),
            ("token_refresh", &self.rate_limiting.token_refresh),
            ("email_verification", &self.rate_limiting.email_verification),
        ] {
            if rule.max_attempts == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limiting.{name}.max_attempts must be > 0"
                )));
            }
            if rule.window.is_zero() {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limiting.{name}.window must be > 0"
                )));
            }
        }

        Ok(())
    }
}
