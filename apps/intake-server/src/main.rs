//! Document intake API server
//!
//! Accepts PDF uploads from signed-in users, extracts labeled fields and keeps
//! an interactive, highlighted page preview per session. Provides REST
//! endpoints for:
//!
//! - Plan catalog, subscription status and upload history
//! - Session lifecycle and document upload (quota-gated)
//! - Navigation, field highlighting, search and field edits
//! - PNG previews, extracted text and structured JSON of the text

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod error;
mod handlers;
mod models;
mod state;
mod store;
mod structuring;

use config::Config;
use state::AppState;

/// Command-line arguments for the intake server
#[derive(Parser, Debug)]
#[command(name = "intake-server")]
#[command(about = "Document intake API with field extraction and highlighted previews")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Build the router with all routes and middleware
pub fn app(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Account
        .route("/api/plans", get(handlers::list_plans))
        .route("/api/subscription", get(handlers::get_subscription))
        .route("/api/uploads", get(handlers::list_uploads))
        // Sessions
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/sessions/:id/document", post(handlers::upload_document))
        .route("/api/sessions/:id/actions", post(handlers::apply_action))
        .route("/api/sessions/:id/preview", get(handlers::preview))
        .route("/api/sessions/:id/text", get(handlers::get_text))
        .route("/api/sessions/:id/structure", post(handlers::structure))
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("intake_server={}", level).parse()?)
                .add_directive(format!("intake_core={}", level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    // Initialize application state
    info!("Initializing intake server...");
    let state = Arc::new(AppState::new(&config).await?);

    let sweeper = Arc::clone(&state);
    let every = std::time::Duration::from_secs(config.server.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            sweeper.sweep_expired().await;
        }
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!(
        "Structuring service: {}",
        if state.structuring.is_configured() {
            config.structuring.endpoint.as_str()
        } else {
            "disabled (no OPENAI_API_KEY)"
        }
    );

    axum::serve(listener, app(state)).await?;

    Ok(())
}
