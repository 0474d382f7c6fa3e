//! HTTP surface: liveness endpoints plus the command seam.
//!
//! The chat transport lives outside this process; `POST /command` is the
//! hole it plugs into, taking one command line as the body and returning
//! the reply text.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::commands::CommandRouter;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<CommandRouter>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/command", post(command))
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not install ctrl-c handler: {e}");
        return;
    }
    info!("shutdown signal received");
}

async fn index() -> &'static str {
    "stashbot is running"
}

async fn health() -> Json<Value> {
    Json(json!({
        "ok": true,
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn ping() -> Json<Value> {
    Json(json!({ "pong": true }))
}

async fn command(State(state): State<AppState>, body: String) -> String {
    state.router.dispatch(&body).await
}
