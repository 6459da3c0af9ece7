//! Settings table queries

use crate::Result;
use sqlx::SqlitePool;

/// Get a setting value as a string, or None if missing/NULL
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten())
}

/// Get a setting parsed as i64, or None if missing or unparseable
pub async fn get_setting_i64(pool: &SqlitePool, key: &str) -> Result<Option<i64>> {
    Ok(get_setting(pool, key).await?.and_then(|v| v.parse().ok()))
}

/// Set (insert or replace) a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}
