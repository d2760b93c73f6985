use axum::http::{HeaderValue, Method, header};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

pub mod auth;
pub mod clock;
pub mod config;
pub mod security;
pub mod user_repository;

use auth::{
    AuthManager, AuthManagerDeps, EphemeralStateStore, HttpKeySet, MemoryStateStore,
    RedisStateStore, create_auth_router,
};
use clock::{Clock, SystemClock};
use config::{Config, LoggingConfig, ServerConfig};
use security::{audit_channel, spawn_audit_worker};
use user_repository::{Argon2Passwords, UserDirectory};

/// Capacity of the in-process audit queue
const AUDIT_QUEUE_CAPACITY: usize = 1024;

const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if result.is_err() {
        debug!("Tracing subscriber already installed");
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "success": true, "message": "moneylog api is running" }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unparsable CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Assemble the HTTP application around an authentication manager
pub fn build_app(auth_manager: Arc<AuthManager>, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .nest("/app/auth", create_auth_router(auth_manager))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Starts the web server with the given configuration and account store.
///
/// The server:
/// 1. Validates the configuration
/// 2. Connects the handshake state store (Redis when configured)
/// 3. Spawns the audit worker
/// 4. Serves until the shutdown receiver fires
pub async fn start_server_with_config(
    config: Config,
    users: Arc<dyn UserDirectory>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    config.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let state_store: Arc<dyn EphemeralStateStore> = match &config.auth.redis_url {
        Some(url) => Arc::new(RedisStateStore::connect(url).await?),
        None => {
            warn!("auth.redis_url not set, LINE handshakes are kept in process memory");
            Arc::new(MemoryStateStore::new(clock.clone()))
        }
    };

    let (audit_sink, audit_rx) = audit_channel(AUDIT_QUEUE_CAPACITY);
    let audit_worker = spawn_audit_worker(audit_rx);

    let auth_manager = Arc::new(AuthManager::new(
        &config.auth,
        &config.line,
        AuthManagerDeps {
            state_store,
            key_set: Arc::new(HttpKeySet::new(config.line.jwks_url.clone())?),
            users,
            passwords: Arc::new(Argon2Passwords),
            audit: Arc::new(audit_sink),
            clock,
        },
    )?);

    let app = build_app(auth_manager, &config.server);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);
    debug!(
        develop_mode = config.auth.develop_mode,
        cors_origins = ?config.server.cors_origins,
        "Server configuration"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
        info!("shutdown requested, draining connections");
    })
    .await?;

    // The router owned the last audit sender; let the worker flush what is queued
    if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, audit_worker).await.is_err() {
        warn!("audit worker did not drain within {:?}", AUDIT_DRAIN_TIMEOUT);
    }
    info!("server stopped");
    Ok(())
}
