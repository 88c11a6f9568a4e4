//! Lantern Server
//!
//! Single-user conversational front end for a code-running AI agent.
//! Streams the agent's reply token-by-token over WebSocket, transcoding
//! `<insight>` spans into rendered callouts on the way through.

mod logging;
mod orchestrator;
mod pending_log;
mod session_guard;
mod state;
mod store;
mod transcoder;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Router};
use clap::Parser;
use lantern_model::{anthropic, AnthropicClient};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;
use crate::websocket::ws_handler;

#[derive(Debug, Parser)]
#[command(name = "lantern", about = "Conversational front end for a code-running AI agent")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 4600, env = "LANTERN_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logging = logging::init_logging()?;

    info!(
        component = "main",
        event = "server.starting",
        "Starting Lantern server"
    );

    if std::env::var(anthropic::API_KEY_ENV).is_err() {
        // The server still comes up; each turn fails fast with a descriptive
        // message until a credential is provided.
        warn!(
            component = "main",
            event = "server.no_credential",
            "{} is not set; turns will fail until it is",
            anthropic::API_KEY_ENV
        );
    }

    let model = Arc::new(AnthropicClient::from_env());
    let state = Arc::new(AppState::new(model));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!(
        component = "main",
        event = "server.listening",
        addr = %addr,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
