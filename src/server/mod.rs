// HTTP surface
//
// Thin axum layer over the escalation controller: identification endpoints,
// a health probe, and the daily usage summary.

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod types;

pub use handlers::AppState;
pub use types::{ErrorResponse, IdentifyRequest, IdentifyResponse};

use crate::config::ServerConfig;

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/identify", post(handlers::identify))
        .route("/identify/deeper", post(handlers::identify_deeper))
        .route("/health", get(handlers::health))
        .route("/usage/summary", get(handlers::usage_summary))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct IdentifyServer {
    state: AppState,
    config: ServerConfig,
}

impl IdentifyServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    pub async fn serve(self) -> Result<()> {
        let router = create_router(self.state, self.config.max_body_bytes);
        let listener = tokio::net::TcpListener::bind(&self.config.bind_address)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_address))?;
        tracing::info!("listening on {}", self.config.bind_address);
        axum::serve(listener, router)
            .await
            .context("HTTP server exited")?;
        Ok(())
    }
}
