//! Session orchestration.
//!
//! [`SessionService`] wires the building blocks together: rate limiter
//! in front, credential verification and lockout in the middle, token
//! issuance/rotation behind, audit log alongside. It is the one type an
//! embedding application talks to; everything is dependency-injected
//! through the constructor, no globals.
//!
//! Error discipline: credential and token failures surface as the
//! opaque [`AuthError::InvalidCredentials`] / [`AuthError::InvalidToken`]
//! so callers cannot probe which check failed. The detailed reason goes
//! to the audit log and `tracing` only.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditEvent, AuditEventType, AuditLog, AuditQuery};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password::{hash_password, verify_password};
use crate::ratelimit::{RateLimitAction, RateLimiter};
use crate::storage::{TokenStore, UserStorage};
use crate::token::{JwtService, TokenService, hash_refresh_token};
use crate::types::{RequestOrigin, SessionTokens, TokenKind, TokenStatus, User, UserIdentity};

/// Authentication and session lifecycle orchestrator.
pub struct SessionService {
    config: AuthConfig,
    tokens: TokenService,
    users: Arc<dyn UserStorage>,
    token_store: Arc<dyn TokenStore>,
    rate_limiter: RateLimiter,
    audit: Arc<AuditLog>,
}

impl SessionService {
    /// Creates a session service from validated configuration and
    /// storage backends.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the configuration fails
    /// validation or the signing algorithm is unsupported.
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStorage>,
        token_store: Arc<dyn TokenStore>,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let jwt = Arc::new(JwtService::new(&config.signing)?);
        let tokens = TokenService::new(jwt, token_store.clone(), config.tokens.clone());

        Ok(Self {
            config,
            tokens,
            users,
            token_store,
            rate_limiter: RateLimiter::new(),
            audit: Arc::new(AuditLog::default()),
        })
    }

    /// The audit log backing this service.
    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Authenticates a user by email and password, opening a session.
    ///
    /// On success the previous session (if any) is replaced: a fresh
    /// rotation family is started and its refresh-token hash stored on
    /// the user record.
    ///
    /// # Errors
    ///
    /// - [`AuthError::RateLimited`] when the source IP exceeded the login budget
    /// - [`AuthError::AccountLocked`] while a lockout is active
    /// - [`AuthError::AccountInactive`] for deactivated accounts
    /// - [`AuthError::InvalidCredentials`] for unknown email or wrong password
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        origin: &RequestOrigin,
    ) -> AuthResult<SessionTokens> {
        let now = OffsetDateTime::now_utc();
        self.enforce_rate_limit(RateLimitAction::Login, origin)?;

        let Some(user) = self.users.find_by_email(email).await? else {
            self.audit_login_failure(None, email, origin, "invalid credentials");
            return Err(AuthError::InvalidCredentials);
        };

        if user.is_locked_at(now) {
            let retry_after = user
                .locked_until
                .map(|until| (until - now).whole_seconds().max(1) as u64)
                .unwrap_or(1);
            self.audit_login_failure(Some(&user), email, origin, "account locked");
            return Err(AuthError::account_locked(retry_after));
        }

        if !user.is_active() {
            self.audit_login_failure(Some(&user), email, origin, "account inactive");
            return Err(AuthError::AccountInactive);
        }

        if !verify_password(password, &user.password_hash)? {
            return Err(self.handle_wrong_password(&user, email, origin, now).await?);
        }

        self.users.reset_login_state(user.id, now).await?;
        if self.config.rate_limiting.enabled {
            self.rate_limiter
                .reset(&RateLimitAction::Login.key(origin.rate_limit_id()));
        }

        let refresh = self
            .tokens
            .issue_refresh_token(user.id, Some(&user.email), None, origin)
            .await?;
        let access = self
            .tokens
            .issue_access_token(user.id, Some(&user.email), origin)
            .await?;

        let family = refresh
            .family
            .clone()
            .ok_or_else(|| AuthError::internal("refresh token issued without family"))?;
        self.users
            .set_refresh_token(
                user.id,
                &hash_refresh_token(&refresh.token),
                refresh.expires_at,
                &family,
            )
            .await?;

        if self.config.audit.log_successful_auth {
            self.audit.record(
                AuditEvent::new(AuditEventType::LoginSuccess)
                    .with_user(user.id)
                    .with_email(&user.email)
                    .with_origin(origin),
            );
        }
        if self.config.audit.log_token_operations {
            self.audit.record(
                AuditEvent::new(AuditEventType::TokenIssued)
                    .with_user(user.id)
                    .with_origin(origin)
                    .with_detail("family", family),
            );
        }

        Ok(SessionTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: self.tokens.access_token_lifetime_secs(),
        })
    }

    /// Exchanges a refresh token for a new token pair.
    ///
    /// Rotation is single-use and atomic: of two concurrent exchanges
    /// of the same token, exactly one succeeds. The loser is treated as
    /// a replay, which revokes the whole rotation family.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for expired, revoked, reused
    /// or otherwise invalid tokens; [`AuthError::RateLimited`] when the
    /// source IP exceeded the refresh budget.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        origin: &RequestOrigin,
    ) -> AuthResult<SessionTokens> {
        self.refresh_inner(refresh_token, origin)
            .await
            .map_err(AuthError::into_public)
    }

    async fn refresh_inner(
        &self,
        refresh_token: &str,
        origin: &RequestOrigin,
    ) -> AuthResult<SessionTokens> {
        self.enforce_rate_limit(RateLimitAction::TokenRefresh, origin)?;

        // Revocation is deliberately not checked here: a rotated-out
        // token is revoked yet must still be recognized as a replay.
        let data = self.tokens.decode(refresh_token, TokenKind::Refresh)?;
        let family = data.family.clone().ok_or_else(|| {
            tracing::debug!("refresh token without family claim");
            AuthError::InvalidToken
        })?;

        let user = self
            .users
            .find_by_id(data.subject)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active() {
            return Err(AuthError::AccountInactive);
        }

        // The record's status tells a replay apart from a family that
        // is already dead.
        if let Some(record) = self.token_store.get(&data.jti).await? {
            match record.status {
                TokenStatus::Compromised => {
                    tracing::debug!(user_id = %user.id, "token from a revoked family presented");
                    return Err(AuthError::InvalidToken);
                }
                TokenStatus::Revoked => {
                    // Single-use token presented a second time.
                    return Err(self.handle_token_reuse(&user, &family, origin).await?);
                }
                TokenStatus::Active | TokenStatus::Expired => {}
            }
        }

        // Mint the replacement pair before the swap so the new refresh
        // hash exists to swap in. If the swap loses, everything minted
        // here is revoked again below.
        let new_refresh = self
            .tokens
            .issue_refresh_token(user.id, Some(&user.email), Some(family.clone()), origin)
            .await?;
        let new_access = self
            .tokens
            .issue_access_token(user.id, Some(&user.email), origin)
            .await?;

        let presented_hash = hash_refresh_token(refresh_token);
        let rotated = self
            .users
            .rotate_refresh_token(
                user.id,
                &presented_hash,
                &hash_refresh_token(&new_refresh.token),
                new_refresh.expires_at,
            )
            .await?;

        if !rotated {
            // Lost the swap race, or replayed against a pruned record.
            // The minted refresh token dies with the family below; the
            // minted access token carries no family, revoke it by id.
            self.token_store.revoke(&new_access.jti).await?;
            return Err(self.handle_token_reuse(&user, &family, origin).await?);
        }

        // Single use: the presented token is dead from here on.
        self.token_store.revoke(&data.jti).await?;

        if self.config.audit.log_token_operations {
            self.audit.record(
                AuditEvent::new(AuditEventType::TokenRefreshed)
                    .with_user(user.id)
                    .with_origin(origin)
                    .with_detail("family", family),
            );
        }

        Ok(SessionTokens {
            access_token: new_access.token,
            refresh_token: new_refresh.token,
            expires_in: self.tokens.access_token_lifetime_secs(),
        })
    }

    /// Verifies a bearer access token and resolves the caller identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for any invalid credential;
    /// the rejection is audited as unauthorized access.
    pub async fn authenticate(
        &self,
        bearer_token: &str,
        origin: &RequestOrigin,
    ) -> AuthResult<UserIdentity> {
        match self.tokens.verify(bearer_token, TokenKind::Access).await {
            Ok(data) => Ok(UserIdentity {
                user_id: data.subject,
                email: data.email,
                token_id: data.jti,
            }),
            Err(err) => {
                if err.is_token_error() && self.config.audit.log_failed_auth {
                    self.audit.record(
                        AuditEvent::failure(
                            AuditEventType::UnauthorizedAccess,
                            "invalid access token",
                        )
                        .with_origin(origin),
                    );
                }
                Err(err.into_public())
            }
        }
    }

    /// Ends the current session: revokes the active rotation family and
    /// clears the stored refresh state.
    ///
    /// Outstanding access tokens are untouched and expire naturally;
    /// use [`SessionService::logout_all_devices`] to cut those too.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the user does not exist.
    pub async fn logout(&self, user_id: Uuid) -> AuthResult<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::storage(format!("user {user_id} not found")))?;

        let mut revoked = 0;
        if let Some(family) = &user.token_family {
            revoked = self.token_store.revoke_family(family).await?;
        }
        self.users.clear_refresh_token(user_id).await?;

        self.audit.record(
            AuditEvent::new(AuditEventType::TokenRevoked)
                .with_user(user_id)
                .with_detail("reason", "user logout")
                .with_detail("revoked_tokens", revoked),
        );
        Ok(())
    }

    /// Revokes every outstanding token for the user, across all kinds
    /// and families, and clears the stored refresh state.
    ///
    /// # Errors
    ///
    /// Returns a storage error if revocation or the user update fails.
    pub async fn logout_all_devices(&self, user_id: Uuid) -> AuthResult<()> {
        let revoked = self.token_store.revoke_all_for_subject(user_id).await?;
        self.users.clear_refresh_token(user_id).await?;

        self.audit.record(
            AuditEvent::new(AuditEventType::TokenRevoked)
                .with_user(user_id)
                .with_detail("reason", "logout all devices")
                .with_detail("revoked_tokens", revoked),
        );
        Ok(())
    }

    /// Changes the user's password after re-verifying the current one.
    ///
    /// All outstanding tokens are revoked: a password change is the
    /// canonical "I think someone else has my credentials" action.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the current password
    /// does not match (or the user does not exist).
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(current_password, &user.password_hash)? {
            tracing::debug!(%user_id, "password change rejected, current password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = hash_password(new_password)?;
        self.users.set_password_hash(user_id, &new_hash).await?;

        let revoked = self.token_store.revoke_all_for_subject(user_id).await?;
        self.users.clear_refresh_token(user_id).await?;

        self.audit.record(
            AuditEvent::new(AuditEventType::PasswordChanged)
                .with_user(user_id)
                .with_detail("revoked_tokens", revoked),
        );
        Ok(())
    }

    /// Queries the audit log. Access control is the embedding
    /// application's concern.
    #[must_use]
    pub fn list_audit_events(&self, query: &AuditQuery, limit: usize) -> Vec<AuditEvent> {
        self.audit.query(query, limit)
    }

    /// Drops rate-limiter keys with no live attempts and no active
    /// lockout, bounding memory in a long-running process. Returns the
    /// number of keys removed.
    pub fn prune_rate_limits(&self) -> usize {
        self.rate_limiter
            .prune_idle(self.config.rate_limiting.longest_window())
    }

    /// Spawns a background task that runs
    /// [`SessionService::prune_rate_limits`] every `every`.
    ///
    /// Companion to [`crate::storage::spawn_cleanup_task`]; abort the
    /// returned handle for a clean shutdown.
    pub fn spawn_rate_limit_pruner(
        self: Arc<Self>,
        every: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick fires immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = self.prune_rate_limits();
                if removed > 0 {
                    tracing::debug!(removed, "pruned idle rate-limit keys");
                }
            }
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn enforce_rate_limit(
        &self,
        action: RateLimitAction,
        origin: &RequestOrigin,
    ) -> AuthResult<()> {
        if !self.config.rate_limiting.enabled {
            return Ok(());
        }
        let key = action.key(origin.rate_limit_id());
        let rule = self.config.rate_limiting.rule_for(action);
        self.rate_limiter.check(&key, rule)
    }

    /// Wrong-password path: count the failure, lock at the threshold,
    /// audit, and hand back the opaque rejection.
    async fn handle_wrong_password(
        &self,
        user: &User,
        email: &str,
        origin: &RequestOrigin,
        now: OffsetDateTime,
    ) -> AuthResult<AuthError> {
        let attempts = self.users.record_failed_login(user.id).await?;
        let max_attempts = self.config.lockout.max_login_attempts;

        if attempts >= max_attempts {
            let until = now + self.config.lockout.lockout_duration;
            self.users.lock_until(user.id, until).await?;
            self.audit.record(
                AuditEvent::new(AuditEventType::AccountLocked)
                    .with_user(user.id)
                    .with_email(email)
                    .with_origin(origin)
                    .with_detail("failed_attempts", attempts),
            );
        }

        if self.config.audit.log_failed_auth {
            self.audit.record(
                AuditEvent::failure(AuditEventType::LoginFailed, "invalid credentials")
                    .with_user(user.id)
                    .with_email(email)
                    .with_origin(origin)
                    .with_detail("remaining_attempts", max_attempts.saturating_sub(attempts)),
            );
        }

        Ok(AuthError::InvalidCredentials)
    }

    /// Replay response: kill the whole family (including anything just
    /// minted into it), detach it from the user, and raise the internal
    /// reuse signal.
    async fn handle_token_reuse(
        &self,
        user: &User,
        family: &str,
        origin: &RequestOrigin,
    ) -> AuthResult<AuthError> {
        let revoked = self.token_store.revoke_family(family).await?;

        if user.token_family.as_deref() == Some(family) {
            self.users.clear_refresh_token(user.id).await?;
        }

        // Always audited, regardless of config: this is an incident.
        self.audit.record(
            AuditEvent::new(AuditEventType::TokenReuseDetected)
                .with_user(user.id)
                .with_origin(origin)
                .with_detail("family", family),
        );
        self.audit.record(
            AuditEvent::new(AuditEventType::TokenFamilyRevoked)
                .with_user(user.id)
                .with_detail("family", family)
                .with_detail("revoked_tokens", revoked),
        );

        tracing::warn!(user_id = %user.id, "refresh token reuse detected, family revoked");
        Ok(AuthError::token_reuse_detected(family))
    }

    fn audit_login_failure(
        &self,
        user: Option<&User>,
        email: &str,
        origin: &RequestOrigin,
        reason: &str,
    ) {
        if !self.config.audit.log_failed_auth {
            return;
        }
        let mut event = AuditEvent::failure(AuditEventType::LoginFailed, reason)
            .with_email(email)
            .with_origin(origin);
        if let Some(user) = user {
            event = event.with_user(user.id);
        }
        self.audit.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditSeverity;
    use crate::storage::{InMemoryTokenStore, InMemoryUserStorage};
    use std::time::Duration;

    const PASSWORD: &str = "correct horse battery staple";

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.signing.secret = "test-secret-that-is-long-enough-0123456789".to_string();
        config
    }

    struct Fixture {
        service: SessionService,
        users: Arc<InMemoryUserStorage>,
        store: Arc<InMemoryTokenStore>,
        user_id: Uuid,
    }

    fn fixture(config: AuthConfig) -> Fixture {
        let users = Arc::new(InMemoryUserStorage::new());
        let store = Arc::new(InMemoryTokenStore::new());

        let user = User::new("ana@example.org", hash_password(PASSWORD).unwrap());
        let user_id = user.id;
        users.insert(user);

        let service = SessionService::new(config, users.clone(), store.clone()).unwrap();
        Fixture {
            service,
            users,
            store,
            user_id,
        }
    }

    fn count_events(service: &SessionService, event_type: AuditEventType) -> usize {
        service
            .list_audit_events(
                &AuditQuery {
                    event_type: Some(event_type),
                    ..AuditQuery::default()
                },
                1000,
            )
            .len()
    }

    #[tokio::test]
    async fn test_login_success() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let tokens = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        assert_eq!(tokens.expires_in, 1800);

        let identity = fx.service.authenticate(&tokens.access_token, &origin).await.unwrap();
        assert_eq!(identity.user_id, fx.user_id);
        assert_eq!(identity.email.as_deref(), Some("ana@example.org"));

        let user = fx.users.find_by_id(fx.user_id).await.unwrap().unwrap();
        assert!(user.last_login.is_some());
        assert!(user.refresh_token_hash.is_some());
        assert!(user.token_family.is_some());

        assert_eq!(count_events(&fx.service, AuditEventType::LoginSuccess), 1);
        assert_eq!(count_events(&fx.service, AuditEventType::TokenIssued), 1);
    }

    #[tokio::test]
    async fn test_login_unknown_email_is_opaque() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let err = fx
            .service
            .login("nobody@example.org", PASSWORD, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        // The failure is audited with the probed email.
        let events = fx.service.list_audit_events(
            &AuditQuery {
                event_type: Some(AuditEventType::LoginFailed),
                ..AuditQuery::default()
            },
            10,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].email.as_deref(), Some("nobody@example.org"));
    }

    #[tokio::test]
    async fn test_login_wrong_password_is_opaque() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let err = fx
            .service
            .login("ana@example.org", "wrong password", &origin)
            .await
            .unwrap_err();
        // Same rejection as an unknown email.
        assert!(matches!(err, AuthError::InvalidCredentials));

        let user = fx.users.find_by_id(fx.user_id).await.unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 1);
    }

    #[tokio::test]
    async fn test_account_locks_at_exact_threshold() {
        let mut config = test_config();
        config.lockout.max_login_attempts = 3;
        let fx = fixture(config);
        let origin = RequestOrigin::from_ip("203.0.113.7");

        for _ in 0..2 {
            let err = fx
                .service
                .login("ana@example.org", "wrong password", &origin)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
            assert_eq!(count_events(&fx.service, AuditEventType::AccountLocked), 0);
        }

        // Third failure crosses the threshold and locks.
        let err = fx
            .service
            .login("ana@example.org", "wrong password", &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(count_events(&fx.service, AuditEventType::AccountLocked), 1);

        // Even the correct password is rejected while locked, with a
        // retry-after hint.
        let err = fx
            .service
            .login("ana@example.org", PASSWORD, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));
        assert!(err.retry_after().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_inactive_account_rejected() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let mut user = fx.users.find_by_id(fx.user_id).await.unwrap().unwrap();
        user.active = false;
        fx.users.insert(user);

        let err = fx
            .service
            .login("ana@example.org", PASSWORD, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));
    }

    #[tokio::test]
    async fn test_login_rate_limited_per_ip() {
        let mut config = test_config();
        config.rate_limiting.login = crate::ratelimit::RateLimitRule::new(
            2,
            Duration::from_secs(300),
        );
        let fx = fixture(config);
        let origin = RequestOrigin::from_ip("203.0.113.7");

        for _ in 0..2 {
            let _ = fx.service.login("ana@example.org", "wrong password", &origin).await;
        }
        let err = fx
            .service
            .login("ana@example.org", PASSWORD, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { .. }));

        // A different source IP is unaffected.
        let other = RequestOrigin::from_ip("198.51.100.1");
        assert!(fx.service.login("ana@example.org", PASSWORD, &other).await.is_ok());
    }

    #[tokio::test]
    async fn test_successful_login_resets_ip_budget() {
        let mut config = test_config();
        config.rate_limiting.login =
            crate::ratelimit::RateLimitRule::new(3, Duration::from_secs(300));
        let fx = fixture(config);
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let _ = fx.service.login("ana@example.org", "wrong password", &origin).await;
        let _ = fx.service.login("ana@example.org", "wrong password", &origin).await;
        fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();

        // The success cleared the counter; three fresh attempts fit.
        for _ in 0..2 {
            let _ = fx.service.login("ana@example.org", "wrong password", &origin).await;
        }
        let err = fx
            .service
            .login("ana@example.org", "wrong password", &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_rate_limiting_can_be_disabled() {
        let mut config = test_config();
        config.rate_limiting.enabled = false;
        config.rate_limiting.login =
            crate::ratelimit::RateLimitRule::new(1, Duration::from_secs(300));
        let fx = fixture(config);
        let origin = RequestOrigin::from_ip("203.0.113.7");

        for _ in 0..5 {
            fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_refresh_rotates_single_use() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let session = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        let rotated = fx.service.refresh(&session.refresh_token, &origin).await.unwrap();
        assert_ne!(rotated.refresh_token, session.refresh_token);

        // The access token from before the rotation is still valid.
        assert!(fx.service.authenticate(&session.access_token, &origin).await.is_ok());

        // The rotated-in refresh token keeps working.
        let again = fx.service.refresh(&rotated.refresh_token, &origin).await.unwrap();
        assert!(fx.service.authenticate(&again.access_token, &origin).await.is_ok());

        assert_eq!(count_events(&fx.service, AuditEventType::TokenRefreshed), 2);
    }

    #[tokio::test]
    async fn test_refresh_reuse_revokes_family() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let session = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        let rotated = fx.service.refresh(&session.refresh_token, &origin).await.unwrap();

        // Replaying the consumed token is rejected with the opaque error.
        let err = fx
            .service
            .refresh(&session.refresh_token, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        // The whole family is dead, including the legitimate successor.
        let err = fx
            .service
            .refresh(&rotated.refresh_token, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        // The user's stored session is cleared; only a new login helps.
        let user = fx.users.find_by_id(fx.user_id).await.unwrap().unwrap();
        assert!(user.refresh_token_hash.is_none());
        assert!(user.token_family.is_none());
        assert!(fx.service.login("ana@example.org", PASSWORD, &origin).await.is_ok());

        // Exactly one critical event for the incident.
        let critical = fx.service.list_audit_events(
            &AuditQuery {
                min_severity: Some(AuditSeverity::Critical),
                ..AuditQuery::default()
            },
            100,
        );
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].event_type, AuditEventType::TokenReuseDetected);
        assert_eq!(
            count_events(&fx.service, AuditEventType::TokenFamilyRevoked),
            1
        );
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let session = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        let err = fx
            .service
            .refresh(&session.access_token, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_logout_kills_refresh_but_not_access() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let session = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        fx.service.logout(fx.user_id).await.unwrap();

        // The refresh family is gone...
        let err = fx
            .service
            .refresh(&session.refresh_token, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        // ...but the access token rides out its natural lifetime.
        assert!(fx.service.authenticate(&session.access_token, &origin).await.is_ok());

        let user = fx.users.find_by_id(fx.user_id).await.unwrap().unwrap();
        assert!(user.refresh_token_hash.is_none());

        let events = fx.service.list_audit_events(
            &AuditQuery {
                event_type: Some(AuditEventType::TokenRevoked),
                ..AuditQuery::default()
            },
            10,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details["reason"], "user logout");
    }

    #[tokio::test]
    async fn test_logout_all_devices_kills_everything() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let session = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        fx.service.logout_all_devices(fx.user_id).await.unwrap();

        assert!(fx.service.authenticate(&session.access_token, &origin).await.is_err());
        assert!(fx.service.refresh(&session.refresh_token, &origin).await.is_err());

        let events = fx.service.list_audit_events(
            &AuditQuery {
                event_type: Some(AuditEventType::TokenRevoked),
                ..AuditQuery::default()
            },
            10,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details["reason"], "logout all devices");
    }

    #[tokio::test]
    async fn test_change_password_invalidates_all_tokens() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let session = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        fx.service
            .change_password(fx.user_id, PASSWORD, "a brand new passphrase")
            .await
            .unwrap();

        // A cryptographically valid access token is now rejected.
        let err = fx
            .service
            .authenticate(&session.access_token, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
        assert!(fx.service.refresh(&session.refresh_token, &origin).await.is_err());

        // Old password no longer works; the new one does.
        assert!(matches!(
            fx.service.login("ana@example.org", PASSWORD, &origin).await,
            Err(AuthError::InvalidCredentials)
        ));
        fx.service
            .login("ana@example.org", "a brand new passphrase", &origin)
            .await
            .unwrap();

        assert_eq!(count_events(&fx.service, AuditEventType::PasswordChanged), 1);
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let fx = fixture(test_config());

        let err = fx
            .service
            .change_password(fx.user_id, "wrong password", "whatever new")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        // Nothing was revoked or changed.
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_authenticate_garbage_is_audited() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let err = fx.service.authenticate("garbage", &origin).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
        assert_eq!(
            count_events(&fx.service, AuditEventType::UnauthorizedAccess),
            1
        );
    }

    #[tokio::test]
    async fn test_new_login_replaces_previous_session() {
        let fx = fixture(test_config());
        let origin = RequestOrigin::from_ip("203.0.113.7");

        let first = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();
        let _second = fx.service.login("ana@example.org", PASSWORD, &origin).await.unwrap();

        // The first session's refresh token no longer matches the
        // stored hash; replaying it trips the reuse response.
        let err = fx
            .service
            .refresh(&first.refresh_token, &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_prune_rate_limits_drops_idle_keys() {
        let mut config = test_config();
        let rule = crate::ratelimit::RateLimitRule::new(5, Duration::from_secs(1));
        config.rate_limiting.login = rule;
        config.rate_limiting.register = rule;
        config.rate_limiting.password_reset = rule;
        config.rate_limiting.email_verification = rule;
        config.rate_limiting.token_refresh = rule;
        let fx = fixture(config);
        let origin = RequestOrigin::from_ip("203.0.113.7");

        // Record one attempt against the login budget for this IP.
        let _ = fx.service.login("nobody@example.org", PASSWORD, &origin).await;
        assert_eq!(fx.service.prune_rate_limits(), 0);

        // Once the attempt falls outside every window, the key goes.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fx.service.prune_rate_limits(), 1);
        assert_eq!(fx.service.prune_rate_limits(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let mut config = AuthConfig::default();
        config.signing.secret = "short".to_string();

        let result = SessionService::new(
            config,
            Arc::new(InMemoryUserStorage::new()),
            Arc::new(InMemoryTokenStore::new()),
        );
        assert!(matches!(result, Err(AuthError::Configuration { .. })));
    }
}
