//! Token revocation registry
//!
//! Logout adds the token's `jti` here; `auth_middleware` rejects any token
//! whose id is present. An entry only has to outlive the token it revokes,
//! so entries past their token's `exp` may be purged.

use async_trait::async_trait;
use stash_core::{RevocationBackend, RevocationRepository, SqliteStore, StashError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Revocation registry errors
#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("Revocation store error: {0}")]
    Store(#[from] StashError),
}

/// Set of revoked token ids
#[async_trait]
pub trait RevocationRegistry: Send + Sync {
    /// Revoke a token id until `expires_at` (unix seconds). Idempotent.
    async fn revoke(&self, jti: &str, expires_at: u64) -> Result<(), RevocationError>;

    /// Whether a token id has been revoked
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError>;

    /// Drop entries whose token has already expired; returns how many
    async fn purge_expired(&self) -> Result<u64, RevocationError>;
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Process-lifetime registry; forgotten on restart
#[derive(Debug, Default)]
pub struct InMemoryRevocationRegistry {
    entries: RwLock<HashMap<String, u64>>,
}

impl InMemoryRevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl RevocationRegistry for InMemoryRevocationRegistry {
    async fn revoke(&self, jti: &str, expires_at: u64) -> Result<(), RevocationError> {
        self.entries
            .write()
            .await
            .entry(jti.to_string())
            .or_insert(expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        Ok(self.entries.read().await.contains_key(jti))
    }

    async fn purge_expired(&self) -> Result<u64, RevocationError> {
        let now = unix_now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at >= now);
        Ok((before - entries.len()) as u64)
    }
}

/// Registry backed by the `revoked_tokens` table; survives restarts
pub struct SqlRevocationRegistry {
    repo: Arc<dyn RevocationRepository>,
}

impl SqlRevocationRegistry {
    pub fn new(repo: Arc<dyn RevocationRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl RevocationRegistry for SqlRevocationRegistry {
    async fn revoke(&self, jti: &str, expires_at: u64) -> Result<(), RevocationError> {
        let expires_at = i64::try_from(expires_at).unwrap_or(i64::MAX);
        self.repo.insert_revoked(jti, expires_at).await?;
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        Ok(self.repo.is_revoked(jti).await?)
    }

    async fn purge_expired(&self) -> Result<u64, RevocationError> {
        let now = i64::try_from(unix_now()).unwrap_or(i64::MAX);
        Ok(self.repo.delete_expired_revocations(now).await?)
    }
}

/// Build the registry selected by configuration
pub fn build_registry(
    backend: RevocationBackend,
    store: &SqliteStore,
) -> Arc<dyn RevocationRegistry> {
    match backend {
        RevocationBackend::Memory => Arc::new(InMemoryRevocationRegistry::new()),
        RevocationBackend::Database => Arc::new(SqlRevocationRegistry::new(Arc::new(
            store.clone(),
        ))),
    }
}

/// Periodically purge expired entries in the background
pub fn spawn_purge_task(
    registry: Arc<dyn RevocationRegistry>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match registry.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired token revocations"),
                Err(e) => tracing::warn!("Revocation purge failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registries() -> Vec<Arc<dyn RevocationRegistry>> {
        let store = SqliteStore::in_memory().await.unwrap();
        vec![
            build_registry(RevocationBackend::Memory, &store),
            build_registry(RevocationBackend::Database, &store),
        ]
    }

    #[tokio::test]
    async fn test_revoke_and_check() {
        for registry in registries().await {
            let exp = unix_now() + 600;

            assert!(!registry.is_revoked("a").await.unwrap());
            registry.revoke("a", exp).await.unwrap();
            assert!(registry.is_revoked("a").await.unwrap());
            assert!(!registry.is_revoked("b").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        for registry in registries().await {
            let exp = unix_now() + 600;

            registry.revoke("a", exp).await.unwrap();
            registry.revoke("a", exp).await.unwrap();
            assert!(registry.is_revoked("a").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_purge_keeps_live_entries() {
        for registry in registries().await {
            let now = unix_now();
            registry.revoke("live", now + 600).await.unwrap();
            registry.revoke("dead", now - 600).await.unwrap();

            assert_eq!(registry.purge_expired().await.unwrap(), 1);
            assert!(registry.is_revoked("live").await.unwrap());
            assert!(!registry.is_revoked("dead").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_concurrent_revokes() {
        let registry = Arc::new(InMemoryRevocationRegistry::new());
        let exp = unix_now() + 600;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.revoke("same", exp).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.len().await, 1);
    }
}
