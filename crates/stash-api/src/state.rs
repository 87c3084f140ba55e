//! Application state management

use crate::auth::jwt::JwtConfig;
use crate::auth::password::PasswordConfig;
use crate::auth::revocation::{build_registry, RevocationRegistry};
use crate::auth::service::AuthService;
use crate::items::ItemService;
use crate::middleware::HttpMetrics;
use stash_core::{AppConfig, SqliteStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Ready status
    pub is_ready: AtomicBool,
    /// Credential, item and revocation storage
    pub store: SqliteStore,
    /// Token signing settings
    pub jwt_config: JwtConfig,
    /// Revoked token ids
    pub revocations: Arc<dyn RevocationRegistry>,
    /// Registration, login, logout and profiles
    pub auth: AuthService,
    /// Per-user items
    pub items: ItemService,
    /// Prometheus collectors
    pub metrics: HttpMetrics,
}

impl AppState {
    /// Wire services over an opened store
    pub fn new(config: AppConfig, store: SqliteStore) -> anyhow::Result<Self> {
        let revocations = build_registry(config.auth.revocation_backend, &store);
        let jwt_config = JwtConfig::from(&config.auth);

        let auth = AuthService::new(
            Arc::new(store.clone()),
            jwt_config.clone(),
            PasswordConfig::from(config.auth.password),
            revocations.clone(),
        );
        let items = ItemService::new(Arc::new(store.clone()), config.items.ownership_policy());

        Ok(Self {
            start_time: Instant::now(),
            is_ready: AtomicBool::new(true),
            store,
            jwt_config,
            revocations,
            auth,
            items,
            metrics: HttpMetrics::new()?,
            config,
        })
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
