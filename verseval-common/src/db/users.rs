//! Users table queries: demographics and per-user quota overrides

use crate::Result;
use sqlx::SqlitePool;

/// Demographics captured when a participant first starts a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demographics {
    pub age: Option<i64>,
    pub gender: String,
    pub education: String,
}

impl Demographics {
    /// Normalized comparison used for the resume-or-reject decision:
    /// a returning participant must present the same demographics.
    pub fn matches(&self, other: &Demographics) -> bool {
        self.age == other.age
            && self.gender.trim() == other.gender.trim()
            && self.education.trim() == other.education.trim()
    }
}

/// Fetch stored demographics for a user, or None if unknown
pub async fn get_demographics(pool: &SqlitePool, user_id: &str) -> Result<Option<Demographics>> {
    let row = sqlx::query_as::<_, (Option<i64>, Option<String>, Option<String>)>(
        "SELECT age, gender, education FROM users WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(age, gender, education)| Demographics {
        age,
        gender: gender.unwrap_or_default(),
        education: education.unwrap_or_default(),
    }))
}

/// Store demographics for a new participant
pub async fn store_demographics(
    pool: &SqlitePool,
    user_id: &str,
    demographics: &Demographics,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO users (user_id, age, gender, education)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(demographics.age)
    .bind(&demographics.gender)
    .bind(&demographics.education)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the per-user quota override, or None if the default applies
pub async fn get_limit_override(pool: &SqlitePool, user_id: &str) -> Result<Option<i64>> {
    let row: Option<Option<i64>> =
        sqlx::query_scalar("SELECT evaluation_limit FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.flatten())
}

/// Increase a user's quota by `increment`, starting from `default_limit` if
/// no override exists yet. Returns the new limit.
///
/// Single-statement UPDATE so concurrent increases cannot lose each other's
/// increments to a read-then-write race.
pub async fn increase_limit(
    pool: &SqlitePool,
    user_id: &str,
    default_limit: i64,
    increment: i64,
) -> Result<i64> {
    sqlx::query(
        "UPDATE users SET evaluation_limit = COALESCE(evaluation_limit, ?) + ? WHERE user_id = ?",
    )
    .bind(default_limit)
    .bind(increment)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(get_limit_override(pool, user_id).await?.unwrap_or(default_limit))
}
