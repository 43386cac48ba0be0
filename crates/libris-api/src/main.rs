//! libris API Server
//!
//! REST API server for the libris library backend.

use anyhow::Context;
use libris_api::{auth::spawn_refresh_token_sweeper, create_router, state::AppState};
use libris_core::{
    AppConfig, DatabaseBackend, LoggingConfig, MemoryStore, PgStore, RefreshTokenStore,
    UserDirectory,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "libris_api={level},libris_core={level},audit=info,tower_http=info",
            level = logging.level
        ))
    });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// `LIBRIS_CONFIG` names a TOML file whose values the environment can override
fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("LIBRIS_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)
            .with_context(|| format!("failed to load config file {path}"))?
            .with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

async fn open_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn UserDirectory>, Arc<dyn RefreshTokenStore>)> {
    match config.database.backend {
        DatabaseBackend::Postgres => {
            let store = PgStore::connect(
                &config.database.postgres_url,
                config.database.postgres_pool_size,
            )
            .await
            .context("failed to connect to PostgreSQL")?;
            store
                .ensure_schema()
                .await
                .context("failed to create schema")?;
            tracing::info!("Using PostgreSQL backend");
            let users: Arc<dyn UserDirectory> = Arc::new(store.user_directory());
            let refresh_tokens: Arc<dyn RefreshTokenStore> = Arc::new(store.refresh_tokens());
            Ok((users, refresh_tokens))
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory backend; accounts are lost on restart");
            let store = MemoryStore::new();
            let users: Arc<dyn UserDirectory> = store.users;
            let refresh_tokens: Arc<dyn RefreshTokenStore> = store.refresh_tokens;
            Ok((users, refresh_tokens))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);

    let (users, refresh_tokens) = open_stores(&config).await?;
    let state = Arc::new(AppState::new(config, users, refresh_tokens));

    if let Some(seed) = &state.config.seed_owner {
        let created = state
            .auth
            .ensure_owner(&seed.email, &seed.password)
            .await
            .context("failed to seed owner account")?;
        if !created {
            tracing::info!(email = %seed.email, "Owner account already present");
        }
    }

    let sweeper = match state.config.auth.sweep_interval_secs {
        0 => None,
        secs => Some(spawn_refresh_token_sweeper(
            state.auth.clone(),
            Duration::from_secs(secs),
        )),
    };

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    tracing::info!(
        revocation_mode = ?state.gate.mode(),
        "libris API server starting on http://{}",
        addr
    );
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    Ok(())
}
