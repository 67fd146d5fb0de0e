//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, InMemoryStore, OpenAiGenerationAdapter},
    config::{Config, ConfigError},
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use talki_core::ports::GenerationService;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const DEV_USER: &str = "dev-user";

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize the Generation Service ---
    let api_key = config
        .generation_api_key
        .as_ref()
        .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(&config.generation_api_base);
    let generator: Arc<dyn GenerationService> = Arc::new(OpenAiGenerationAdapter::new(
        Client::with_config(openai_config),
        config.phrase_model.clone(),
        config.chat_model.clone(),
    ));

    // --- 3. Connect to Storage & Build the Shared AppState ---
    let app_state = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(AppState::new(db_adapter, generator, config.clone()))
        }
        None => {
            warn!("DATABASE_URL is not set; data lives in memory and is lost on exit");
            let store = InMemoryStore::new();
            match &config.dev_session_token {
                Some(token) => store.register_token(token, DEV_USER).await,
                None => warn!("DEV_SESSION_TOKEN is not set; every protected route will answer 401"),
            }
            Arc::new(AppState::new(Arc::new(store), generator, config.clone()))
        }
    };

    // --- 4. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    let api_router = web::router(app_state.clone())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for the shutdown signal: {}", e);
            }
        })
        .await?;

    // Jobs still running are cancelled and left as `failed`.
    info!(
        "Server stopped; cancelling {} phrase job(s)",
        app_state.phrase_jobs.in_flight()
    );
    app_state.phrase_jobs.shutdown().await;
    Ok(())
}
