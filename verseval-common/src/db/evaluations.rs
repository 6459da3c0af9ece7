//! Evaluations table queries
//!
//! The evaluation log doubles as the durable rating store: the selection
//! engine's rating ledger is rebuilt from `image_rating_counts` at startup.

use crate::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

/// A completed evaluation ready to be written
#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub user_id: String,
    pub age: Option<i64>,
    pub gender: String,
    pub education: String,
    pub poem_title: String,
    pub image_path: String,
    pub image_kind: String,
    pub phase1_choice: String,
    pub phase1_response_ms: i64,
    pub phase2_answers: serde_json::Value,
    pub phase2_response_ms: i64,
    pub total_response_ms: i64,
}

/// A recently completed evaluation, for the admin view
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompletedEvaluation {
    pub ts: String,
    pub user_id: String,
    pub poem_title: String,
    pub image_path: String,
    pub phase1_choice: String,
}

/// Write one evaluation row. Returns the row guid.
pub async fn write_evaluation(pool: &SqlitePool, eval: &NewEvaluation) -> Result<String> {
    let guid = Uuid::new_v4().to_string();
    let ts = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO evaluations (
            guid, ts, user_id, age, gender, education,
            poem_title, image_path, image_kind,
            phase1_choice, phase1_response_ms,
            phase2_answers, phase2_response_ms, total_response_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(&ts)
    .bind(&eval.user_id)
    .bind(eval.age)
    .bind(&eval.gender)
    .bind(&eval.education)
    .bind(&eval.poem_title)
    .bind(&eval.image_path)
    .bind(&eval.image_kind)
    .bind(&eval.phase1_choice)
    .bind(eval.phase1_response_ms)
    .bind(eval.phase2_answers.to_string())
    .bind(eval.phase2_response_ms)
    .bind(eval.total_response_ms)
    .execute(pool)
    .await?;

    Ok(guid)
}

/// Count how many evaluations a user has completed
pub async fn user_evaluation_count(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evaluations WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Rating counts for every image that has at least one evaluation.
///
/// Images never evaluated are absent; callers default them to 0.
pub async fn image_rating_counts(pool: &SqlitePool) -> Result<HashMap<String, u32>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT image_path, COUNT(*) FROM evaluations GROUP BY image_path",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(path, count)| (path, count.max(0) as u32))
        .collect())
}

/// Most recent completed evaluations, newest first
pub async fn recent_evaluations(pool: &SqlitePool, limit: i64) -> Result<Vec<CompletedEvaluation>> {
    let rows = sqlx::query_as::<_, (String, String, String, String, String)>(
        r#"
        SELECT ts, user_id, poem_title, image_path, phase1_choice
        FROM evaluations
        ORDER BY ts DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(ts, user_id, poem_title, image_path, phase1_choice)| CompletedEvaluation {
            ts,
            user_id,
            poem_title,
            image_path,
            phase1_choice,
        })
        .collect())
}
