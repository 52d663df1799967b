//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/session", post(http::http_start_session))
        .route("/api/v1/state", get(http::http_get_state))
        .route("/api/v1/consent", post(http::http_post_consent))
        .route("/api/v1/demographics", post(http::http_post_demographics))
        .route("/api/v1/instructions", post(http::http_post_instructions))
        .route("/api/v1/attempt", post(http::http_post_attempt))
        .route("/api/v1/initial_rubric", post(http::http_post_initial_rubric))
        .route("/api/v1/reply", post(http::http_post_reply))
        .route("/api/v1/finish", post(http::http_post_finish))
        .route("/api/v1/rubric", post(http::http_post_rubric))
        .route("/api/v1/followup", post(http::http_post_followup))
        .route("/api/v1/next_task", post(http::http_post_next_task))
        .route("/api/v1/comments", post(http::http_post_comments))
        .route("/api/v1/save", post(http::http_post_save))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
