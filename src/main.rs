// src/main.rs
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::{extract::Extension, middleware, Router};
use dotenv::dotenv;
use reqwest::Client;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod auth;
mod cache;
mod common;
mod events;
mod logging_middleware;
mod users;

#[cfg(test)]
mod testing;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use auth::{AuthService, TokenIssuer};
use cache::{Cache, CacheClient, MemoryCache, RedisCache};
use common::config::AvatarStorage;
use common::{AppConfig, AppState};
use events::{EventBus, EventPublisher, InMemoryPublisher, RabbitMqPublisher};
use users::avatar::{AvatarStore, CdnAvatarStore, LocalAvatarStore};
use users::social::HttpLinkProber;
use users::{SqliteUserStore, UserService, UserStore};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env();

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    let pool = connect_database(&config.database_url).await?;
    common::migrations::run_migrations(&pool, config.reset_db).await?;

    // ========================================================================
    // CACHE & BROKER
    // ========================================================================

    let cache_backend: Arc<dyn Cache> = match &config.redis_url {
        Some(url) => {
            let redis = RedisCache::new(url)?;
            redis.ping().await?;
            info!("Redis cache connected");
            Arc::new(redis)
        }
        None => {
            warn!("REDIS_URL not set, using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };
    let cache = CacheClient::new(cache_backend);

    let publisher: Arc<dyn EventPublisher> = match &config.rabbitmq_url {
        Some(url) => {
            let rabbit = RabbitMqPublisher::connect(url).await?;
            info!("RabbitMQ publisher connected");
            Arc::new(rabbit)
        }
        None => {
            warn!("RABBITMQ_URL not set, events are only logged");
            Arc::new(InMemoryPublisher::new())
        }
    };
    let events = EventBus::new(publisher);

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let http_client = Client::builder()
        .timeout(config.outbound_timeout)
        .build()?;

    let avatars: Arc<dyn AvatarStore> = match &config.avatars {
        AvatarStorage::Local { dir, public_prefix } => {
            tokio::fs::create_dir_all(dir).await?;
            Arc::new(LocalAvatarStore::new(dir.clone(), public_prefix.clone()))
        }
        AvatarStorage::Cdn { origin } => {
            Arc::new(CdnAvatarStore::new(http_client.clone(), origin.clone()))
        }
    };

    let store: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(pool));
    let tokens = Arc::new(TokenIssuer::new(config.tokens.clone()));

    let user_service = Arc::new(UserService::new(
        store.clone(),
        cache.clone(),
        events.clone(),
        avatars,
        Arc::new(HttpLinkProber::new(http_client)),
        config.profile.clone(),
    ));
    info!("UserService initialized");

    let auth_service = Arc::new(AuthService::new(
        store,
        cache,
        events,
        user_service.clone(),
        tokens.clone(),
        config.workflow.clone(),
    ));
    info!("AuthService initialized");

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let shared = Arc::new(AppState {
        auth_service,
        user_service,
        tokens,
        avatars: config.avatars.clone(),
    });

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        .merge(auth::auth_routes())
        .merge(users::users_routes(config.profile.max_avatar_bytes + 64 * 1024))
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        .layer(middleware::from_fn(logging_middleware::log_request_response))
        .layer(Extension(shared))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Open the SQLite pool, creating the database file and its directory
async fn connect_database(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    let file = options.clone().get_filename();
    if let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }

    Ok(SqlitePoolOptions::new().connect_with(options).await?)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
