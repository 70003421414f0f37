//! Sliding-window rate limiting for authentication endpoints.
//!
//! Each sensitive action (login, register, password reset, token refresh,
//! email verification) is throttled independently: keys are namespaced as
//! `"<action>:<identifier>"` so exhausting one action's budget never
//! affects another's.
//!
//! Attempts are counted in a trailing window, pruned lazily on each
//! check. An attempt is recorded *before* the limit decision, so probing
//! the limiter is never free. A rule may additionally configure a hard
//! lockout that starts once the budget is exhausted.
//!
//! # Concurrency
//!
//! All state lives behind a single mutex acquired once per operation, so
//! `check` is an atomic check-and-record unit. Two concurrent checks on
//! the same key can never both observe the same attempt count.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthError;

/// Rate limit rule for one protected action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitRule {
    /// Attempts allowed within the window.
    pub max_attempts: u32,

    /// Length of the sliding window.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Hard lockout applied once the budget is exhausted.
    /// Zero disables lockout: rejections then report the time until the
    /// oldest attempt leaves the window (minimum one second).
    #[serde(with = "humantime_serde")]
    pub lockout: Duration,
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(300))
    }
}

impl RateLimitRule {
    /// Creates a rule with no hard lockout.
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            lockout: Duration::ZERO,
        }
    }

    /// Sets the hard lockout duration.
    #[must_use]
    pub fn with_lockout(mut self, lockout: Duration) -> Self {
        self.lockout = lockout;
        self
    }
}

/// Protected actions with independent rate-limit namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    /// Password login attempts.
    Login,
    /// Account registration.
    Register,
    /// Password reset requests.
    PasswordReset,
    /// Refresh-token exchanges.
    TokenRefresh,
    /// Email verification attempts.
    EmailVerification,
}

impl RateLimitAction {
    /// Returns the namespace prefix for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::PasswordReset => "password_reset",
            Self::TokenRefresh => "refresh",
            Self::EmailVerification => "email_verification",
        }
    }

    /// Builds the rate-limit key for an identifier (typically an IP).
    #[must_use]
    pub fn key(&self, identifier: &str) -> String {
        format!("{}:{}", self.as_str(), identifier)
    }
}

impl std::fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-key limiter state.
#[derive(Debug, Default)]
struct KeyState {
    /// Attempt timestamps within (roughly) the current window.
    /// Pruned lazily on each check.
    attempts: Vec<OffsetDateTime>,

    /// Hard lockout expiry, if one is active.
    locked_until: Option<OffsetDateTime>,
}

/// In-memory sliding-window rate limiter.
///
/// Suitable for a single-process deployment; a distributed deployment
/// would implement the same arithmetic against a shared store whose
/// mutations are single atomic server-side commands.
#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<HashMap<String, KeyState>>,
}

impl RateLimiter {
    /// Creates an empty rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks and records an attempt for `key` under `rule`.
    ///
    /// The attempt is recorded even when the outcome is a rejection, so
    /// abuse cannot free-ride by querying without counting.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimited`] with the retry-after duration
    /// when the key is locked out or its budget is exhausted.
    pub fn check(&self, key: &str, rule: &RateLimitRule) -> Result<(), AuthError> {
        self.check_at(key, rule, OffsetDateTime::now_utc())
    }

    /// [`RateLimiter::check`] with an explicit clock, for deterministic tests.
    pub fn check_at(
        &self,
        key: &str,
        rule: &RateLimitRule,
        now: OffsetDateTime,
    ) -> Result<(), AuthError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let entry = state.entry(key.to_string()).or_default();

        if let Some(locked_until) = entry.locked_until {
            if now < locked_until {
                let retry_after = (locked_until - now).whole_seconds().max(1) as u64;
                return Err(AuthError::rate_limited(retry_after));
            }
            // Lockout expired: forgive the key entirely.
            entry.locked_until = None;
            entry.attempts.clear();
        }

        let window_start = now - rule.window;
        entry.attempts.retain(|ts| *ts > window_start);

        let attempts_in_window = entry.attempts.len();
        entry.attempts.push(now);

        if attempts_in_window >= rule.max_attempts as usize {
            if !rule.lockout.is_zero() {
                entry.locked_until = Some(now + rule.lockout);
                return Err(AuthError::rate_limited(rule.lockout.as_secs()));
            }
            // No hard lockout: retry once the oldest attempt ages out.
            let oldest = entry.attempts.first().copied().unwrap_or(now);
            let retry_after = ((oldest + rule.window) - now).whole_seconds().max(1) as u64;
            return Err(AuthError::rate_limited(retry_after));
        }

        Ok(())
    }

    /// Clears all history and any lockout for `key`.
    ///
    /// Called on a successful login to forgive prior failures.
    pub fn reset(&self, key: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.remove(key);
    }

    /// Returns the number of attempts still available for `key`.
    ///
    /// Applies the same window arithmetic as [`RateLimiter::check`] but
    /// mutates nothing: no attempt is recorded, and the stored history
    /// is left untouched.
    #[must_use]
    pub fn remaining(&self, key: &str, rule: &RateLimitRule) -> u32 {
        self.remaining_at(key, rule, OffsetDateTime::now_utc())
    }

    /// [`RateLimiter::remaining`] with an explicit clock.
    #[must_use]
    pub fn remaining_at(&self, key: &str, rule: &RateLimitRule, now: OffsetDateTime) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = state.get(key) else {
            return rule.max_attempts;
        };

        if entry.locked_until.is_some_and(|until| now < until) {
            return 0;
        }

        let window_start = now - rule.window;
        let in_window = entry.attempts.iter().filter(|ts| **ts > window_start).count();
        rule.max_attempts.saturating_sub(in_window as u32)
    }

    /// Drops keys with no live attempts and no active lockout.
    ///
    /// Bounds memory growth for the in-memory backend; safe to run
    /// concurrently with normal traffic. Returns the number of keys
    /// removed.
    pub fn prune_idle(&self, max_window: Duration) -> usize {
        let now = OffsetDateTime::now_utc();
        let cutoff = now - max_window;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.len();
        state.retain(|_, entry| {
            entry.locked_until.is_some_and(|until| now < until)
                || entry.attempts.iter().any(|ts| *ts > cutoff)
        });
        before - state.len()
    }
}
