//! Tutorlab · AI Tutoring Study Backend
//!
//! - Axum HTTP + WebSocket API driving the study flow
//!   (consent → demographics → instructions → three tutoring tasks → save)
//! - Optional OpenAI integration (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT          : u16 (default 3000)
//!   OPENAI_API_KEY    : enables the tutor backend if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL  : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL   : default "gpt-4o"
//!   STUDY_CONFIG_PATH  : path to TOML config (prompts + task list + problem bank)
//!   SHEET_PATH    : local record file (default "session_records.tsv")
//!   SHEET_ENDPOINT     : optional remote sheet endpoint (HTTP append)
//!   AUDIT_LOG_DIR : base dir for transcript dumps (default ".")
//!   LOG_LEVEL    : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

mod telemetry;
mod util;
mod errors;
mod domain;
mod config;
mod seeds;
mod problems;
mod openai;
mod session;
mod sink;
mod audit;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (session store, problem bank, tutor client, sinks).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "tutorlab_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
