//! Poem/image evaluation service - Main entry point
//!
//! Serves the two-phase evaluation study: image assignment through the
//! priority-queue selection engine, phase-1 title choice, phase-2
//! questionnaire, durable evaluation records in SQLite.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use verseval_common::catalog::ImageCatalog;
use verseval_common::config::{load_study_settings, resolve_root_folder};
use verseval_common::db::init_database;
use verseval_common::questions::QuestionSet;
use verseval_web::api;
use verseval_web::selection::SelectionEngine;
use verseval_web::session::SessionManager;

/// Command-line arguments for verseval-web
#[derive(Parser, Debug)]
#[command(name = "verseval-web")]
#[command(about = "Poem/image evaluation study service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "VERSEVAL_PORT")]
    port: u16,

    /// Root folder containing images/, poems.toml, questions.toml and the database
    #[arg(short, long, env = "VERSEVAL_ROOT_FOLDER")]
    root_folder: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verseval_web=debug,verseval_common=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), "VERSEVAL_ROOT_FOLDER")
        .context("Failed to resolve root folder")?;

    info!("Starting verseval-web on port {}", args.port);
    info!("Root folder: {}", root_folder.display());

    let db = init_database(&root_folder.join("verseval.db"))
        .await
        .context("Failed to initialize database")?;

    let settings = load_study_settings(&db)
        .await
        .context("Failed to load study settings")?;

    let catalog = Arc::new(
        ImageCatalog::load(&root_folder.join("images"), &root_folder.join("poems.toml"))
            .context("Failed to load image catalog")?,
    );
    info!("Catalog loaded: {} images", catalog.len());

    let questions = Arc::new(
        QuestionSet::load(&root_folder.join("questions.toml"))
            .context("Failed to load questionnaire")?,
    );

    let engine = Arc::new(
        SelectionEngine::load(&catalog, db.clone())
            .await
            .context("Failed to initialize selection engine")?,
    );

    // Background reclaim: expired assignments return to the queue even when
    // no one is requesting new rounds
    let reclaim_engine = Arc::clone(&engine);
    let timeout = chrono::Duration::minutes(settings.assignment_timeout_minutes);
    let interval = Duration::from_secs(settings.reclaim_interval_seconds);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let reclaimed = reclaim_engine.reclaim_timeouts(timeout).await;
            if reclaimed > 0 {
                warn!("Background reclaim returned {} assignments to the queue", reclaimed);
            }
        }
    });

    let sessions = Arc::new(SessionManager::new(
        db.clone(),
        Arc::clone(&engine),
        catalog,
        questions,
        settings,
    ));

    let app_state = api::AppState {
        db,
        engine,
        sessions,
        root_folder: root_folder.to_string_lossy().to_string(),
        port: args.port,
    };

    let app = api::create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
