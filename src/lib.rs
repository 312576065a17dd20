//! Project Forms - GitHub issue forms backed by GitHub Projects
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Issue form pages (server-rendered HTML)                  │
//! │  - GitHub OAuth token endpoints                             │
//! │  - Browser sign-in                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Project Layer                           │
//! │  - Page stages                                              │
//! │  - Field schema mapping and form validation                 │
//! │  - Per-user project cache                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      GitHub Layer                            │
//! │  - REST / GraphQL client                                    │
//! │  - OAuth methods                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers and HTML views
//! - `auth`: Sessions and GitHub sign-in
//! - `project`: Form domain logic
//! - `github`: GitHub API access
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod github;
pub mod metrics;
pub mod project;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; every field is shared.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// GitHub API acting with the user's token
    pub github: Arc<dyn github::GitHubApi>,

    /// OAuth methods of the configured GitHub App
    pub oauth: Arc<github::OAuthClient>,

    /// Form loading and submission
    pub forms: Arc<project::ProjectFormService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("ProjectForms/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let github: Arc<dyn github::GitHubApi> =
            Arc::new(github::GitHubClient::new(http_client.clone(), &config.github));

        Ok(Self::with_github(config, http_client, github))
    }

    /// Build state around a given GitHub API implementation
    ///
    /// `http_client` carries the OAuth calls.
    pub fn with_github(
        config: config::AppConfig,
        http_client: reqwest::Client,
        github: Arc<dyn github::GitHubApi>,
    ) -> Self {
        let oauth = github::OAuthClient::new(http_client, &config.github);
        let store = project::ProjectStore::new(&config.cache);
        let forms = project::ProjectFormService::new(github.clone(), store);

        tracing::info!(
            client_type = config.github.client_type.as_str(),
            credentials = config.github.has_credentials(),
            "Application state initialized"
        );

        Self {
            config: Arc::new(config),
            github,
            oauth: Arc::new(oauth),
            forms: Arc::new(forms),
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    // The OAuth endpoints answer their own preflights
    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::forms_router(state.clone()))
        .layer(cors_layer)
        .nest(
            "/api/github/oauth",
            api::oauth_proxy_router(state.clone()),
        )
        .fallback(api::invalid_url)
        .layer(middleware::from_fn(api::track_requests))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
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
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
