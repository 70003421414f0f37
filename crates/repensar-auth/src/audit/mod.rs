//! Security audit logging.
//!
//! Every security-relevant event (logins, lockouts, token operations,
//! reuse detection) is recorded as a structured [`AuditEvent`] and
//! mirrored to `tracing` at a level derived from its severity.
//!
//! Recording is infallible from the caller's point of view: audit
//! failures must never turn a successful login into an error, so
//! [`AuditLog::record`] degrades to a log line instead of propagating.

use std::collections::VecDeque;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Kinds of auditable security events.
///
/// The session layer emits a subset of these; the rest (registration,
/// password reset, anomaly reporting) belong to flows the embedding
/// application owns and are part of the shared vocabulary so all
/// security events land in one log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Successful password login.
    LoginSuccess,
    /// Failed password login (bad credentials or inactive account).
    LoginFailed,
    /// Login rejected because the account is locked.
    LoginLocked,
    /// Session ended without a token revocation (e.g. client-side).
    Logout,
    /// New token pair issued at login.
    TokenIssued,
    /// Refresh token rotated.
    TokenRefreshed,
    /// Token or session explicitly revoked.
    TokenRevoked,
    /// A rotated-out refresh token was presented again.
    TokenReuseDetected,
    /// A whole rotation family was revoked.
    TokenFamilyRevoked,
    /// New account registered.
    AccountCreated,
    /// Account locked after repeated failures.
    AccountLocked,
    /// Account lockout lifted.
    AccountUnlocked,
    /// Password changed by the user.
    PasswordChanged,
    /// Password reset requested.
    PasswordResetRequested,
    /// Password reset completed.
    PasswordResetCompleted,
    /// Request with a missing or invalid credential.
    UnauthorizedAccess,
    /// Anomalous behavior worth an operator's attention.
    SuspiciousActivity,
}

impl AuditEventType {
    /// Returns the event type as its wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::LoginLocked => "login_locked",
            Self::Logout => "logout",
            Self::TokenIssued => "token_issued",
            Self::TokenRefreshed => "token_refreshed",
            Self::TokenRevoked => "token_revoked",
            Self::TokenReuseDetected => "token_reuse_detected",
            Self::TokenFamilyRevoked => "token_family_revoked",
            Self::AccountCreated => "account_created",
            Self::AccountLocked => "account_locked",
            Self::AccountUnlocked => "account_unlocked",
            Self::PasswordChanged => "password_changed",
            Self::PasswordResetRequested => "password_reset_requested",
            Self::PasswordResetCompleted => "password_reset_completed",
            Self::UnauthorizedAccess => "unauthorized_access",
            Self::SuspiciousActivity => "suspicious_activity",
        }
    }

    /// Default severity for this event type.
    #[must_use]
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            Self::LoginSuccess
            | Self::Logout
            | Self::TokenIssued
            | Self::TokenRefreshed
            | Self::AccountCreated
            | Self::AccountUnlocked
            | Self::PasswordChanged
            | Self::PasswordResetRequested
            | Self::PasswordResetCompleted => AuditSeverity::Info,
            Self::LoginFailed
            | Self::LoginLocked
            | Self::TokenRevoked
            | Self::UnauthorizedAccess => AuditSeverity::Warning,
            Self::AccountLocked | Self::SuspiciousActivity | Self::TokenFamilyRevoked => {
                AuditSeverity::Error
            }
            Self::TokenReuseDetected => AuditSeverity::Critical,
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Routine event.
    Info,
    /// Worth noticing; not yet a problem.
    Warning,
    /// A defense fired.
    Error,
    /// Probable active attack.
    Critical,
}

/// One structured audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// What happened.
    pub event_type: AuditEventType,

    /// How bad it is.
    pub severity: AuditSeverity,

    /// When it happened.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    /// The user involved, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// The email involved, when known. Recorded even for unknown users
    /// so credential-stuffing against nonexistent accounts is visible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Source IP, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// User agent, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Free-form structured details (counts, families, reasons).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,

    /// Whether the underlying operation succeeded.
    pub success: bool,

    /// Error message for failed operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEvent {
    /// Creates a successful event with the type's default severity.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: OffsetDateTime::now_utc(),
            user_id: None,
            email: None,
            ip: None,
            user_agent: None,
            details: Map::new(),
            success: true,
            error_message: None,
        }
    }

    /// Creates a failed event with an error message.
    #[must_use]
    pub fn failure(event_type: AuditEventType, error_message: impl Into<String>) -> Self {
        let mut event = Self::new(event_type);
        event.success = false;
        event.error_message = Some(error_message.into());
        event
    }

    /// Sets the user id.
    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets IP and user agent from a request origin.
    #[must_use]
    pub fn with_origin(mut self, origin: &crate::types::RequestOrigin) -> Self {
        self.ip = origin.ip.clone();
        self.user_agent = origin.user_agent.clone();
        self
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Overrides the default severity.
    #[must_use]
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Filter for querying recorded events. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Only events for this user.
    pub user_id: Option<Uuid>,
    /// Only events of this type.
    pub event_type: Option<AuditEventType>,
    /// Only events at or above this severity.
    pub min_severity: Option<AuditSeverity>,
    /// Only events at or after this time.
    pub from: Option<OffsetDateTime>,
    /// Only events before this time.
    pub to: Option<OffsetDateTime>,
}

impl AuditQuery {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(user_id) = self.user_id
            && event.user_id != Some(user_id)
        {
            return false;
        }
        if let Some(event_type) = self.event_type
            && event.event_type != event_type
        {
            return false;
        }
        if let Some(min) = self.min_severity
            && event.severity < min
        {
            return false;
        }
        if let Some(from) = self.from
            && event.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to
            && event.timestamp >= to
        {
            return false;
        }
        true
    }
}

/// In-memory audit log with bounded retention.
///
/// Events are kept in arrival order up to `capacity`; the oldest are
/// dropped first. A production deployment would additionally ship the
/// `tracing` mirror to durable storage.
pub struct AuditLog {
    events: RwLock<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl AuditLog {
    /// Creates an audit log retaining at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Records an event. Never fails: auditing must not break the
    /// operation being audited.
    pub fn record(&self, event: AuditEvent) {
        match event.severity {
            AuditSeverity::Info => tracing::info!(
                event = %event.event_type,
                user_id = ?event.user_id,
                success = event.success,
                "audit"
            ),
            AuditSeverity::Warning => tracing::warn!(
                event = %event.event_type,
                user_id = ?event.user_id,
                success = event.success,
                "audit"
            ),
            AuditSeverity::Error | AuditSeverity::Critical => tracing::error!(
                event = %event.event_type,
                user_id = ?event.user_id,
                success = event.success,
                "audit"
            ),
        }

        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Returns up to `limit` most recent matching events, oldest first.
    #[must_use]
    pub fn query(&self, query: &AuditQuery, limit: usize) -> Vec<AuditEvent> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if no events are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
