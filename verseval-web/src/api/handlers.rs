//! HTTP request handlers
//!
//! Request/response types plus thin handlers that delegate to the session
//! manager and the selection engine.

use crate::api::AppState;
use crate::error::Error;
use crate::selection::{QueueImageState, SelectionStats};
use crate::session::{RevealData, StartOutcome, Submission, SubmitResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use std::collections::HashMap;
use verseval_common::db::evaluations::{self, CompletedEvaluation};
use verseval_common::db::users::Demographics;
use verseval_common::questions::Question;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub education: String,
}

#[derive(Debug, Deserialize)]
pub struct RevealRequest {
    pub poem_title: String,
    pub target_letter: String,
    pub phase1_choice: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub user_id: String,
    pub poem_title: String,
    pub image_path: String,
    #[serde(default)]
    pub image_kind: String,
    pub phase1_choice: String,
    #[serde(default)]
    pub phase1_response_ms: i64,
    pub phase2_answers: serde_json::Value,
    #[serde(default)]
    pub phase2_response_ms: i64,
    #[serde(default)]
    pub total_response_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct RemainingResponse {
    pub user_id: String,
    pub remaining: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct IncreaseLimitRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct IncreaseLimitResponse {
    pub user_id: String,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct QueueStateResponse {
    pub images: Vec<QueueImageState>,
    pub recent_evaluations: Vec<CompletedEvaluation>,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<Question>,
}

/// Progress of the current rating round (one round = one rating per image)
#[derive(Debug, Serialize, PartialEq)]
pub struct RoundProgress {
    pub round: u32,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CoverageResponse {
    pub total_images: usize,
    pub images_with_5_ratings: usize,
    pub images_with_at_least_1_rating: usize,
    /// Percentage of the catalog with 5 or more ratings
    pub coverage_5_ratings: f64,
    /// Percentage of the catalog with at least 1 rating
    pub coverage_at_least_1: f64,
    /// Lowest unfinished round, capped at 5
    pub current_round: u32,
    pub round_progress: RoundProgress,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::UnknownUser(_) => StatusCode::NOT_FOUND,
        Error::NotPending { .. } => StatusCode::CONFLICT,
        _ => {
            error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(StatusResponse {
            status: err.to_string(),
        }),
    )
}

// ============================================================================
// Session Handlers
// ============================================================================

/// POST /api/v1/session/start
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<StartOutcome>, ApiError> {
    let demographics = Demographics {
        age: req.age,
        gender: req.gender,
        education: req.education,
    };

    let outcome = state
        .sessions
        .start_session(&req.user_id, &demographics)
        .await
        .map_err(api_error)?;

    Ok(Json(outcome))
}

/// POST /api/v1/session/reveal
pub async fn reveal(
    State(state): State<AppState>,
    Json(req): Json<RevealRequest>,
) -> Result<Json<RevealData>, ApiError> {
    let data = state
        .sessions
        .reveal(&req.poem_title, &req.target_letter, &req.phase1_choice)
        .map_err(api_error)?;

    Ok(Json(data))
}

/// POST /api/v1/session/submit
pub async fn submit_evaluation(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResult>, ApiError> {
    let result = state
        .sessions
        .submit_evaluation(Submission {
            user_id: req.user_id,
            poem_title: req.poem_title,
            image_path: req.image_path,
            image_kind: req.image_kind,
            phase1_choice: req.phase1_choice,
            phase1_response_ms: req.phase1_response_ms,
            phase2_answers: req.phase2_answers,
            phase2_response_ms: req.phase2_response_ms,
            total_response_ms: req.total_response_ms,
        })
        .await
        .map_err(api_error)?;

    Ok(Json(result))
}

/// GET /api/v1/session/remaining/:user_id
pub async fn remaining(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<RemainingResponse>, ApiError> {
    let (remaining, limit) = state.sessions.remaining(&user_id).await.map_err(api_error)?;

    Ok(Json(RemainingResponse {
        user_id,
        remaining,
        limit,
    }))
}

/// POST /api/v1/session/increase-limit
pub async fn increase_limit(
    State(state): State<AppState>,
    Json(req): Json<IncreaseLimitRequest>,
) -> Result<Json<IncreaseLimitResponse>, ApiError> {
    let limit = state
        .sessions
        .increase_limit(&req.user_id)
        .await
        .map_err(api_error)?;

    Ok(Json(IncreaseLimitResponse {
        user_id: req.user_id,
        limit,
    }))
}

// ============================================================================
// Monitoring Handlers
// ============================================================================

/// GET /api/v1/questions
pub async fn get_questions(State(state): State<AppState>) -> Json<QuestionsResponse> {
    Json(QuestionsResponse {
        questions: state.sessions.questions().to_vec(),
    })
}

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<SelectionStats> {
    Json(state.engine.statistics().await)
}

/// GET /api/v1/coverage
///
/// Coverage is computed from the durable evaluation counts, so it is
/// consistent across restarts (unlike the in-memory queue statistics).
pub async fn get_coverage(
    State(state): State<AppState>,
) -> Result<Json<CoverageResponse>, ApiError> {
    let counts = evaluations::image_rating_counts(&state.db)
        .await
        .map_err(|e| api_error(Error::Common(e)))?;
    let total_images = state.engine.statistics().await.total_images;

    Ok(Json(coverage_from_counts(total_images, &counts)))
}

/// Round model over the rated subset: the current round is the lowest
/// rating count among rated images plus one, capped at 5; completed counts
/// rated images that reached the round's target count.
fn coverage_from_counts(total_images: usize, counts: &HashMap<String, u32>) -> CoverageResponse {
    let images_with_5 = counts.values().filter(|&&c| c >= 5).count();
    let images_with_1 = counts.len();

    let (current_round, round_completed) = match counts.values().min().copied() {
        None => (1, 0),
        Some(min_ratings) => {
            let round = (min_ratings + 1).min(5);
            let target = round.saturating_sub(1);
            (round, counts.values().filter(|&&c| c >= target).count())
        }
    };

    let percentage = |n: usize| {
        if total_images > 0 {
            n as f64 / total_images as f64 * 100.0
        } else {
            0.0
        }
    };

    CoverageResponse {
        total_images,
        images_with_5_ratings: images_with_5,
        images_with_at_least_1_rating: images_with_1,
        coverage_5_ratings: percentage(images_with_5),
        coverage_at_least_1: percentage(images_with_1),
        current_round,
        round_progress: RoundProgress {
            round: current_round,
            completed: round_completed,
            total: total_images,
        },
    }
}

/// GET /api/v1/admin/queue
pub async fn get_queue_state(
    State(state): State<AppState>,
) -> Result<Json<QueueStateResponse>, ApiError> {
    let images = state.engine.queue_snapshot().await;
    let recent = evaluations::recent_evaluations(&state.db, 20)
        .await
        .map_err(|e| api_error(Error::Common(e)))?;

    Ok(Json(QueueStateResponse {
        images,
        recent_evaluations: recent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn coverage_with_no_ratings() {
        let coverage = coverage_from_counts(10, &HashMap::new());
        assert_eq!(coverage.current_round, 1);
        assert_eq!(coverage.images_with_at_least_1_rating, 0);
        assert_eq!(coverage.coverage_at_least_1, 0.0);
        assert_eq!(
            coverage.round_progress,
            RoundProgress { round: 1, completed: 0, total: 10 }
        );
    }

    #[test]
    fn coverage_percentages_and_buckets() {
        let coverage = coverage_from_counts(4, &counts(&[("a", 5), ("b", 6), ("c", 1)]));
        assert_eq!(coverage.images_with_5_ratings, 2);
        assert_eq!(coverage.images_with_at_least_1_rating, 3);
        assert_eq!(coverage.coverage_5_ratings, 50.0);
        assert_eq!(coverage.coverage_at_least_1, 75.0);
        // Lowest rated image has 1 rating, so round 2 is in progress
        assert_eq!(coverage.current_round, 2);
        assert_eq!(coverage.round_progress.completed, 3);
    }

    #[test]
    fn round_is_capped_at_five() {
        let coverage = coverage_from_counts(2, &counts(&[("a", 9), ("b", 12)]));
        assert_eq!(coverage.current_round, 5);
        assert_eq!(coverage.round_progress.round, 5);
    }

    #[test]
    fn empty_catalog_yields_zero_percentages() {
        let coverage = coverage_from_counts(0, &HashMap::new());
        assert_eq!(coverage.coverage_5_ratings, 0.0);
        assert_eq!(coverage.coverage_at_least_1, 0.0);
    }
}
