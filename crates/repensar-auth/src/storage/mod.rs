//! Storage abstractions and in-memory backends.

pub mod memory;
pub mod token_store;
pub mod user;

pub use memory::{InMemoryTokenStore, InMemoryUserStorage};
pub use token_store::TokenStore;
pub use user::UserStorage;

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

/// Spawns a background task that prunes expired token records.
///
/// Runs [`TokenStore::cleanup_expired`] every `every`; storage errors
/// are logged and the loop keeps going. Dropping the returned handle
/// does not stop the task; abort it for a clean shutdown.
pub fn spawn_cleanup_task(
    store: Arc<dyn TokenStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately; skip it so startup stays quiet.
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.cleanup_expired(OffsetDateTime::now_utc()).await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::debug!(removed, "pruned expired token records");
                }
                Err(error) => {
                    tracing::warn!(%error, "token cleanup failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TokenKind, TokenRecord, TokenStatus};
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_prunes_expired_records() {
        let store = Arc::new(InMemoryTokenStore::new());
        let now = OffsetDateTime::now_utc();
        store
            .put(TokenRecord {
                jti: "stale".to_string(),
                subject: Uuid::new_v4(),
                family: None,
                kind: TokenKind::Access,
                issued_at: now - time::Duration::hours(2),
                expires_at: now - time::Duration::hours(1),
                issued_from_ip: None,
                user_agent: None,
                status: TokenStatus::Active,
            })
            .await
            .unwrap();

        let handle = spawn_cleanup_task(store.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.is_empty());
        handle.abort();
    }
}
