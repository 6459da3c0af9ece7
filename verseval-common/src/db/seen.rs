//! Per-user seen-title persistence
//!
//! The selection engine keeps seen sets in memory for its lifetime; this
//! module makes them durable so a participant who returns after a restart
//! never sees the same poem twice.

use crate::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;

/// Load the full seen-title set for a user (empty set if unknown)
pub async fn load_seen_titles(pool: &SqlitePool, user_id: &str) -> Result<HashSet<String>> {
    let rows: Vec<String> =
        sqlx::query_scalar("SELECT poem_title FROM user_seen WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().collect())
}

/// Record one seen title for a user. Idempotent.
pub async fn record_seen_title(pool: &SqlitePool, user_id: &str, poem_title: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO user_seen (user_id, poem_title) VALUES (?, ?)")
        .bind(user_id)
        .bind(poem_title)
        .execute(pool)
        .await?;

    Ok(())
}
