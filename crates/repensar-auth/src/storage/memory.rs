//! In-memory storage backends.
//!
//! Reference implementations of [`TokenStore`] and [`UserStorage`] for
//! tests and single-process deployments. Each backend keeps all state
//! under one mutex, which trivially provides the atomicity the traits
//! demand.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AuthError;
use crate::storage::{TokenStore, UserStorage};
use crate::types::{TokenRecord, TokenStatus, User};

// ============================================================================
// Token store
// ============================================================================

#[derive(Debug, Default)]
struct TokenStoreInner {
    /// All records, keyed by jti.
    records: HashMap<String, TokenRecord>,
    /// Family -> member jtis.
    by_family: HashMap<String, HashSet<String>>,
    /// Subject -> owned jtis.
    by_subject: HashMap<Uuid, HashSet<String>>,
}

/// In-memory [`TokenStore`].
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    inner: Mutex<TokenStoreInner>,
}

impl InMemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held. Test helper.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).records.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marks a record revoked with `status`, preserving `Compromised`.
/// Returns `true` if the status actually changed.
fn mark_revoked(record: &mut TokenRecord, status: TokenStatus) -> bool {
    if record.status == TokenStatus::Compromised || record.status == status {
        return false;
    }
    record.status = status;
    true
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put(&self, record: TokenRecord) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(family) = &record.family {
            inner
                .by_family
                .entry(family.clone())
                .or_default()
                .insert(record.jti.clone());
        }
        inner
            .by_subject
            .entry(record.subject)
            .or_default()
            .insert(record.jti.clone());
        inner.records.insert(record.jti.clone(), record);
        Ok(())
    }

    async fn get(&self, jti: &str) -> Result<Option<TokenRecord>, AuthError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.records.get(jti).cloned())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, AuthError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.records.get(jti).is_some_and(TokenRecord::is_revoked))
    }

    async fn revoke(&self, jti: &str) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = inner.records.get_mut(jti) {
            mark_revoked(record, TokenStatus::Revoked);
        }
        Ok(())
    }

    async fn revoke_family(&self, family: &str) -> Result<u64, AuthError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let jtis: Vec<String> = inner
            .by_family
            .get(family)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut changed = 0;
        for jti in jtis {
            if let Some(record) = inner.records.get_mut(&jti)
                && mark_revoked(record, TokenStatus::Compromised)
            {
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn revoke_all_for_subject(&self, subject: Uuid) -> Result<u64, AuthError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let jtis: Vec<String> = inner
            .by_subject
            .get(&subject)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut changed = 0;
        for jti in jtis {
            if let Some(record) = inner.records.get_mut(&jti)
                && mark_revoked(record, TokenStatus::Revoked)
            {
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> Result<u64, AuthError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<TokenRecord> = inner
            .records
            .values()
            .filter(|r| r.is_expired_at(now))
            .cloned()
            .collect();

        for record in &expired {
            inner.records.remove(&record.jti);
            if let Some(family) = &record.family
                && let Some(set) = inner.by_family.get_mut(family)
            {
                set.remove(&record.jti);
                if set.is_empty() {
                    inner.by_family.remove(family);
                }
            }
            if let Some(set) = inner.by_subject.get_mut(&record.subject) {
                set.remove(&record.jti);
                if set.is_empty() {
                    inner.by_subject.remove(&record.subject);
                }
            }
        }
        Ok(expired.len() as u64)
    }
}

// ============================================================================
// User storage
// ============================================================================

/// In-memory [`UserStorage`].
#[derive(Debug, Default)]
pub struct InMemoryUserStorage {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user. Test/bootstrap helper.
    pub fn insert(&self, user: User) {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.insert(user.id, user);
    }
}

/// Applies `f` to the user with `id`, or fails with a storage error.
fn with_user<T>(
    users: &Mutex<HashMap<Uuid, User>>,
    id: Uuid,
    f: impl FnOnce(&mut User) -> T,
) -> Result<T, AuthError> {
    let mut users = users.lock().unwrap_or_else(|e| e.into_inner());
    let user = users
        .get_mut(&id)
        .ok_or_else(|| AuthError::storage(format!("user {id} not found")))?;
    Ok(f(user))
}

#[async_trait]
impl UserStorage for InMemoryUserStorage {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users.get(&id).cloned())
    }

    async fn record_failed_login(&self, id: Uuid) -> Result<u32, AuthError> {
        with_user(&self.users, id, |user| {
            user.failed_login_attempts += 1;
            user.failed_login_attempts
        })
    }

    async fn lock_until(&self, id: Uuid, until: OffsetDateTime) -> Result<(), AuthError> {
        with_user(&self.users, id, |user| {
            user.locked_until = Some(until);
        })
    }

    async fn reset_login_state(&self, id: Uuid, now: OffsetDateTime) -> Result<(), AuthError> {
        with_user(&self.users, id, |user| {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login = Some(now);
        })
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
        family: &str,
    ) -> Result<(), AuthError> {
        with_user(&self.users, id, |user| {
            user.refresh_token_hash = Some(token_hash.to_string());
            user.refresh_token_expires_at = Some(expires_at);
            user.token_family = Some(family.to_string());
        })
    }

    async fn clear_refresh_token(&self, id: Uuid) -> Result<(), AuthError> {
        with_user(&self.users, id, |user| {
            user.refresh_token_hash = None;
            user.refresh_token_expires_at = None;
            user.token_family = None;
        })
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<bool, AuthError> {
        with_user(&self.users, id, |user| {
            if user.refresh_token_hash.as_deref() != Some(expected_hash) {
                return false;
            }
            user.refresh_token_hash = Some(new_hash.to_string());
            user.refresh_token_expires_at = Some(expires_at);
            true
        })
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AuthError> {
        with_user(&self.users, id, |user| {
            user.password_hash = password_hash.to_string();
        })
    }
}
