//! Token issuance and verification service.
//!
//! Combines the stateless JWT layer with the token store: every issued
//! token gets a metadata record, and every verification checks both the
//! signature/expiry and the revocation state.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::TokenLifetimeConfig;
use crate::error::AuthError;
use crate::storage::TokenStore;
use crate::token::jwt::{Claims, JwtService, generate_family, generate_jti};
use crate::types::{RequestOrigin, TokenKind, TokenRecord, TokenStatus};

/// A freshly issued token together with its metadata.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed compact JWT.
    pub token: String,
    /// Its unique id.
    pub jti: String,
    /// Rotation family (refresh tokens only).
    pub family: Option<String>,
    /// When it expires.
    pub expires_at: OffsetDateTime,
}

/// Identity and token metadata extracted by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    /// The user the token was issued for.
    pub subject: Uuid,
    /// Email claim, if present.
    pub email: Option<String>,
    /// The token's unique id.
    pub jti: String,
    /// Rotation family (refresh tokens only).
    pub family: Option<String>,
}

/// Issues and verifies access and refresh tokens.
pub struct TokenService {
    jwt: Arc<JwtService>,
    store: Arc<dyn TokenStore>,
    lifetimes: TokenLifetimeConfig,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("lifetimes", &self.lifetimes)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Creates a token service.
    #[must_use]
    pub fn new(
        jwt: Arc<JwtService>,
        store: Arc<dyn TokenStore>,
        lifetimes: TokenLifetimeConfig,
    ) -> Self {
        Self {
            jwt,
            store,
            lifetimes,
        }
    }

    /// Access-token lifetime in seconds, as reported to clients.
    #[must_use]
    pub fn access_token_lifetime_secs(&self) -> u64 {
        self.lifetimes.access_token_lifetime.as_secs()
    }

    /// Issues a short-lived access token.
    ///
    /// # Errors
    ///
    /// Fails if signing or record storage fails.
    pub async fn issue_access_token(
        &self,
        subject: Uuid,
        email: Option<&str>,
        origin: &RequestOrigin,
    ) -> Result<IssuedToken, AuthError> {
        self.issue(subject, email, TokenKind::Access, None, origin).await
    }

    /// Issues a refresh token.
    ///
    /// A `family` of `None` starts a new rotation family (login); a
    /// successor token passes the family it inherits (refresh).
    ///
    /// # Errors
    ///
    /// Fails if signing or record storage fails.
    pub async fn issue_refresh_token(
        &self,
        subject: Uuid,
        email: Option<&str>,
        family: Option<String>,
        origin: &RequestOrigin,
    ) -> Result<IssuedToken, AuthError> {
        let family = family.unwrap_or_else(generate_family);
        self.issue(subject, email, TokenKind::Refresh, Some(family), origin)
            .await
    }

    async fn issue(
        &self,
        subject: Uuid,
        email: Option<&str>,
        kind: TokenKind,
        family: Option<String>,
        origin: &RequestOrigin,
    ) -> Result<IssuedToken, AuthError> {
        let now = OffsetDateTime::now_utc();
        let lifetime = match kind {
            TokenKind::Access => self.lifetimes.access_token_lifetime,
            TokenKind::Refresh => self.lifetimes.refresh_token_lifetime,
        };
        let expires_at = now + lifetime;
        let jti = generate_jti();

        let claims = Claims {
            sub: subject.to_string(),
            email: email.map(String::from),
            exp: expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: jti.clone(),
            kind,
            family: family.clone(),
        };
        let token = self.jwt.encode(&claims)?;

        self.store
            .put(TokenRecord {
                jti: jti.clone(),
                subject,
                family: family.clone(),
                kind,
                issued_at: now,
                expires_at,
                issued_from_ip: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                status: TokenStatus::Active,
            })
            .await?;

        tracing::debug!(%subject, kind = %kind, "token issued");
        Ok(IssuedToken {
            token,
            jti,
            family,
            expires_at,
        })
    }

    /// Decodes a token of the expected kind without consulting
    /// revocation state.
    ///
    /// Checks signature, expiry, the `type` claim, and subject
    /// well-formedness. The rotation path needs this weaker check: a
    /// rotated-out refresh token is revoked but must still be
    /// recognized so its replay can be told apart from garbage.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] on any validation failure;
    /// the distinguishing reason is traced at debug level only.
    pub fn decode(&self, token: &str, expected_kind: TokenKind) -> Result<TokenData, AuthError> {
        let claims = self.jwt.decode(token)?;

        if claims.kind != expected_kind {
            tracing::debug!(
                expected = %expected_kind,
                got = %claims.kind,
                "token kind mismatch"
            );
            return Err(AuthError::InvalidToken);
        }

        let subject = Uuid::parse_str(&claims.sub).map_err(|_| {
            tracing::debug!("token subject is not a uuid");
            AuthError::InvalidToken
        })?;

        Ok(TokenData {
            subject,
            email: claims.email,
            jti: claims.jti,
            family: claims.family,
        })
    }

    /// Verifies a token of the expected kind, including revocation.
    ///
    /// [`TokenService::decode`] plus the revocation check. Every failure
    /// collapses to [`AuthError::InvalidToken`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] on any validation failure, or
    /// a storage error if the revocation lookup itself fails.
    pub async fn verify(
        &self,
        token: &str,
        expected_kind: TokenKind,
    ) -> Result<TokenData, AuthError> {
        let data = self.decode(token, expected_kind)?;

        if self.store.is_revoked(&data.jti).await? {
            tracing::debug!(subject = %data.subject, "revoked token presented");
            return Err(AuthError::InvalidToken);
        }

        Ok(data)
    }
}
