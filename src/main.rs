//! ScanTest · Practice Test Generator Backend
//!
//! - Axum HTTP + WebSocket API
//! - OpenAI integration for text extraction, question generation and difficulty review
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables OpenAI integration if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_VISION_MODEL : default "gpt-4o"
//!   OPENAI_TEXT_MODEL   : default "gpt-4o-mini"
//!   OPENAI_TIMEOUT_SECS : per-request timeout, default 60
//!   AGENT_CONFIG_PATH   : path to TOML config (exam profile + prompts)
//!   STATIC_DIR          : frontend directory, default "./static"
//!   MAX_UPLOAD_BYTES    : request body limit, default 20 MiB (images arrive as base64)
//!   SESSION_TTL_SECS    : idle time before a session is evicted, default 3600
//!   SESSION_SWEEP_SECS  : eviction sweep period, default 60
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use scantest_backend::routes::build_router;
use scantest_backend::state::AppState;
use scantest_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Session registry, prompt service and agent config.
  let state = Arc::new(AppState::new());

  // Idle sessions (closed tabs) are dropped in the background.
  tokio::spawn(state.clone().run_session_sweeper());

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "scantest_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
