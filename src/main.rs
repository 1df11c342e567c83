mod archive;
mod config;
mod error;
mod export;
mod format;
mod gate;
mod listing;
mod presenter;
mod resolver;
mod server;
mod session;
mod views;
mod walk;

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{App, Args};
use crate::server::{build_router, AppState};
use crate::session::MemorySessionStore;
use crate::views::MaudTemplates;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let app = match App::from_args(&args) {
        Ok(app) => app,
        Err(e) => {
            error!("{}. Exiting.", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Serving files from: {}", app.root_path.display());
    if app.password_required() {
        info!("Password login enabled");
    }
    info!("Listening on: {}", args.bind_addr);

    let shared_state = Arc::new(AppState {
        app,
        sessions: Arc::new(MemorySessionStore::new()),
        templates: Arc::new(MaudTemplates),
    });
    let router = build_router(shared_state);

    let listener = match tokio::net::TcpListener::bind(args.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to address {}: {}", args.bind_addr, e);
            eprintln!("Error: Failed to bind to address {}: {}", args.bind_addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
