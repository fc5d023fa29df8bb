// HTTP API

pub mod oauth;

pub use oauth::{create_oauth_router, health, OAuthAppState};

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

/// Full application router: OAuth routes, health check, permissive CORS.
pub fn create_app(state: OAuthAppState) -> Router {
    create_oauth_router(state)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
}
