//! REST API for the evaluation service

pub mod handlers;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::selection::SelectionEngine;
use crate::session::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<SelectionEngine>,
    pub sessions: Arc<SessionManager>,
    /// Root folder path
    pub root_folder: String,
    /// Server port
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let images_dir = PathBuf::from(&state.root_folder).join("images");

    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))

        // API v1 routes
        .nest("/api/v1", Router::new()
            // Session flow
            .route("/session/start", post(handlers::start_session))
            .route("/session/reveal", post(handlers::reveal))
            .route("/session/submit", post(handlers::submit_evaluation))
            .route("/session/remaining/:user_id", get(handlers::remaining))
            .route("/session/increase-limit", post(handlers::increase_limit))

            // Phase-2 questionnaire
            .route("/questions", get(handlers::get_questions))

            // Study monitoring
            .route("/stats", get(handlers::get_stats))
            .route("/coverage", get(handlers::get_coverage))
            .route("/admin/queue", get(handlers::get_queue_state))
        )

        // Static image serving from the root folder
        .nest_service("/images", ServeDir::new(images_dir))
        .layer(TraceLayer::new_for_http())

        // Participants load the study page from wherever it is hosted
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "verseval-web",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
        "root_folder": state.root_folder
    }))
}
