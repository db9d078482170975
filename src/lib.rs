//! authgate - OAuth sign-in, database sessions and a request gate
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Request gate (Axum)                     │
//! │  - Skips static assets and probes                           │
//! │  - Lets the sign-in flow through                            │
//! │  - Redirects everything else without a session              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Auth + API layer                         │
//! │  - OAuth sign-in flow, sign-out, session JSON               │
//! │  - Current user and company endpoints                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Adapter + Data layer                        │
//! │  - AuthAdapter over SQLite (sqlx)                           │
//! │  - Identity and tenancy schema with cascades                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `adapter`: Persistence contract used by the auth layer
//! - `api`: Tenancy API, pages and metrics endpoint
//! - `auth`: Identity provider, sessions and the request gate
//! - `config`: Configuration management
//! - `data`: Database, models and relation metadata
//! - `error`: Error types

pub mod adapter;
pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Persistence used by the sign-in flow and the gate
    pub adapter: Arc<dyn adapter::AuthAdapter>,

    /// Identity provider behind `/auth/signin/:provider`
    pub provider: Arc<dyn auth::IdentityProvider>,
}

impl AppState {
    /// Initialize application state with the Google provider
    ///
    /// # Steps
    /// 1. Build the HTTP client for the provider
    /// 2. Connect to SQLite, migrate and verify relations
    /// 3. Wrap the database in the auth adapter
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("authgate/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let provider = auth::GoogleProvider::new(&config.auth.google, http_client);

        Self::with_provider(config, Arc::new(provider)).await
    }

    /// Initialize application state with a custom identity provider
    pub async fn with_provider(
        config: config::AppConfig,
        provider: Arc<dyn auth::IdentityProvider>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = Arc::new(data::Database::connect(&config.database).await?);
        tracing::info!("Database connected");

        let adapter = adapter::SqliteAdapter::new(db.clone(), config.auth.passkeys_enabled);
        tracing::info!(
            provider = provider.id(),
            passkeys = config.auth.passkeys_enabled,
            "Auth adapter ready"
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            adapter: Arc::new(adapter),
            provider,
        })
    }
}

/// Build the Axum router with all routes.
///
/// Shared by the binary and integration tests. The gate wraps every route;
/// it skips `/health` and `/metrics` itself.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::pages_router())
        .merge(api::me_router())
        .merge(api::companies_router())
        .merge(api::metrics_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth::session_gate))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Invalid CORS origin; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
