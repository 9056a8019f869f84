//! Router assembly: HTTP endpoints, WebSocket progress stream, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
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
/// - Request bodies up to `max_upload_bytes` (page photos arrive base64-encoded)
/// - Static SPA from `STATIC_DIR` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let index = format!("{}/index.html", state.static_dir.trim_end_matches('/'));
    let body_limit = state.max_upload_bytes;
    let static_service = ServeDir::new(&state.static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(index));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/sessions", post(http::http_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/sessions/:id/generate", post(http::http_post_generate))
        .route("/api/v1/sessions/:id/reset", post(http::http_post_reset))
        .route("/api/v1/sessions/:id/quiz", get(http::http_get_quiz))
        .route("/api/v1/sessions/:id/quiz/next", post(http::http_post_next))
        .route("/api/v1/sessions/:id/quiz/previous", post(http::http_post_previous))
        .route("/api/v1/sessions/:id/quiz/goto", post(http::http_post_goto))
        .route("/api/v1/sessions/:id/quiz/answer", post(http::http_post_answer))
        .route("/api/v1/sessions/:id/quiz/submit", post(http::http_post_submit))
        .route("/api/v1/sessions/:id/results", get(http::http_get_results))
        // Body limit + state + CORS + HTTP tracing
        .layer(DefaultBodyLimit::max(body_limit))
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
