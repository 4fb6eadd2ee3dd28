//! faceapid: HTTP service for face detection, comparison and attribute
//! analysis, with account registration and bearer-token auth.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod password;
pub mod routes;
pub mod token;
pub mod upload;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use faceapi_core::Pipeline;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::metadata::MetadataStore;
use crate::token::TokenManager;
use crate::users::UserStore;

/// State shared between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: EngineHandle,
    pub users: UserStore,
    pub metadata: Arc<MetadataStore>,
    pub tokens: TokenManager,
    /// Client for `url` image inputs.
    pub http: reqwest::Client,
}

impl AppState {
    /// Assemble state around an already running engine and user store.
    pub fn new(config: Config, engine: EngineHandle, users: UserStore) -> anyhow::Result<Self> {
        let secret = match config.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                tracing::warn!(
                    "FACEAPI_JWT_SECRET not set; using a random secret, tokens will not survive a restart"
                );
                token::random_secret().to_vec()
            }
        };
        let tokens = TokenManager::new(&secret, config.token_ttl_secs);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            metadata: Arc::new(MetadataStore::new(config.metadata_path.clone())),
            config: Arc::new(config),
            engine,
            users,
            tokens,
            http,
        })
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let layers = ServiceBuilder::new()
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION]))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        );

    let protected = Router::new()
        .route("/detect", post(routes::detect::handler))
        .route("/compare", post(routes::compare::handler))
        .route(
            "/metadata",
            post(routes::metadata::save).get(routes::metadata::list),
        )
        .nest("/api/v1/face", routes::v1::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    Router::new()
        .route("/health", get(routes::health::handler))
        .route("/register", post(routes::account::register))
        .route("/login", post(routes::account::login))
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state)
        .layer(layers)
}

/// Open stores, load models and start the engine thread.
pub async fn initialize_state(config: Config) -> anyhow::Result<AppState> {
    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("creating upload directory {}", config.upload_dir.display()))?;

    let users = UserStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening user database {}", config.db_path.display()))?;

    let paths = config.model_paths();
    let pipeline = tokio::task::spawn_blocking(move || Pipeline::load(&paths))
        .await?
        .context("loading face models")?;
    let engine = engine::spawn_engine(pipeline)?;
    tracing::info!(models = ?engine.status(), "face engine ready");

    AppState::new(config, engine, users)
}
