//! Stash API Server
//!
//! REST API server for accounts, JWT sessions and per-user items.

use stash_api::auth::revocation::spawn_purge_task;
use stash_api::{create_router, state::AppState};
use stash_core::{AppConfig, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("STASH_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("stash_api={level},stash_core={level},tower_http={level},audit=info").into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received, draining connections");
    state.set_ready(false);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config);

    if config.uses_default_secret() {
        tracing::warn!(
            "JWT_SECRET_KEY is not set; signing tokens with the built-in development secret"
        );
    }

    let store =
        SqliteStore::connect(&config.database.url, config.database.max_connections).await?;
    tracing::info!("Database ready at {}", config.database.url);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let purge_every = Duration::from_secs(config.auth.revocation_purge_interval_secs.max(1));

    // Create application state
    let state = Arc::new(AppState::new(config, store)?);
    let _purge = spawn_purge_task(state.revocations.clone(), purge_every);

    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Stash API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}
