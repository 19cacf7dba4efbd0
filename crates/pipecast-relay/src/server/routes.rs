//! HTTP routes.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::registry::SessionRegistry;

use super::socket::ws_handler;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    sessions: usize,
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.len().await,
    })
}

/// Build the relay router with the WebSocket transport at `socket_path`.
///
/// Browsers connect from arbitrary origins, so CORS is fully permissive.
pub fn build_router(state: AppState, socket_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(socket_path, get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
