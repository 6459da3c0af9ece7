//! Database layer integration tests
//!
//! Exercises schema initialization, settings defaults, demographics and
//! quota handling, evaluation rows and rating counts, and seen-title
//! persistence against real on-disk and in-memory databases.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

use verseval_common::db::evaluations::{self, NewEvaluation};
use verseval_common::db::users::{self, Demographics};
use verseval_common::db::{init, init_database, seen, settings};

async fn memory_pool() -> SqlitePool {
    // One connection: separate handles would each get their own :memory: db
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init::create_settings_table(&pool).await.unwrap();
    init::create_users_table(&pool).await.unwrap();
    init::create_evaluations_table(&pool).await.unwrap();
    init::create_user_seen_table(&pool).await.unwrap();
    pool
}

fn evaluation(user_id: &str, image_path: &str, poem_title: &str) -> NewEvaluation {
    NewEvaluation {
        user_id: user_id.to_string(),
        age: Some(30),
        gender: "f".to_string(),
        education: "ba".to_string(),
        poem_title: poem_title.to_string(),
        image_path: image_path.to_string(),
        image_kind: "gpt".to_string(),
        phase1_choice: "A".to_string(),
        phase1_response_ms: 1000,
        phase2_answers: serde_json::json!({"q1": "yes"}),
        phase2_response_ms: 5000,
        total_response_ms: 6000,
    }
}

#[tokio::test]
async fn init_database_creates_file_and_defaults() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("data").join("verseval.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    // Defaults seeded on first run
    let limit = settings::get_setting_i64(&pool, "max_evaluations_per_user")
        .await
        .unwrap();
    assert_eq!(limit, Some(10));
    let step = settings::get_setting_i64(&pool, "limit_increase_step")
        .await
        .unwrap();
    assert_eq!(step, Some(5));
}

#[tokio::test]
async fn init_database_preserves_modified_settings() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("verseval.db");

    {
        let pool = init_database(&db_path).await.unwrap();
        settings::set_setting(&pool, "max_evaluations_per_user", "25")
            .await
            .unwrap();
        pool.close().await;
    }

    // Re-init must not clobber the operator's value
    let pool = init_database(&db_path).await.unwrap();
    let limit = settings::get_setting_i64(&pool, "max_evaluations_per_user")
        .await
        .unwrap();
    assert_eq!(limit, Some(25));
}

#[tokio::test]
async fn ensure_setting_resets_null_values() {
    let pool = memory_pool().await;

    sqlx::query("INSERT INTO settings (key, value) VALUES ('distractor_count', NULL)")
        .execute(&pool)
        .await
        .unwrap();

    init::ensure_setting(&pool, "distractor_count", "3").await.unwrap();
    let value = settings::get_setting_i64(&pool, "distractor_count")
        .await
        .unwrap();
    assert_eq!(value, Some(3));
}

#[tokio::test]
async fn settings_roundtrip_and_upsert() {
    let pool = memory_pool().await;

    assert_eq!(settings::get_setting(&pool, "missing").await.unwrap(), None);

    settings::set_setting(&pool, "phase2_question_count", "12")
        .await
        .unwrap();
    settings::set_setting(&pool, "phase2_question_count", "8")
        .await
        .unwrap();

    let value = settings::get_setting_i64(&pool, "phase2_question_count")
        .await
        .unwrap();
    assert_eq!(value, Some(8));
}

#[tokio::test]
async fn demographics_store_and_match() {
    let pool = memory_pool().await;

    let demo = Demographics {
        age: Some(41),
        gender: " m ".to_string(),
        education: "phd".to_string(),
    };
    users::store_demographics(&pool, "kai", &demo).await.unwrap();

    let stored = users::get_demographics(&pool, "kai").await.unwrap().unwrap();
    assert_eq!(stored.age, Some(41));

    // Matching trims whitespace
    let trimmed = Demographics {
        age: Some(41),
        gender: "m".to_string(),
        education: "phd".to_string(),
    };
    assert!(stored.matches(&trimmed));

    let different = Demographics {
        age: None,
        ..trimmed
    };
    assert!(!stored.matches(&different));

    assert!(users::get_demographics(&pool, "nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn quota_override_and_increase() {
    let pool = memory_pool().await;

    users::store_demographics(
        &pool,
        "kai",
        &Demographics {
            age: None,
            gender: String::new(),
            education: String::new(),
        },
    )
    .await
    .unwrap();

    assert_eq!(users::get_limit_override(&pool, "kai").await.unwrap(), None);

    let new_limit = users::increase_limit(&pool, "kai", 10, 5).await.unwrap();
    assert_eq!(new_limit, 15);

    // Second increase starts from the stored override
    let new_limit = users::increase_limit(&pool, "kai", 10, 5).await.unwrap();
    assert_eq!(new_limit, 20);
    assert_eq!(
        users::get_limit_override(&pool, "kai").await.unwrap(),
        Some(20)
    );
}

#[tokio::test]
async fn concurrent_increases_do_not_lose_updates() {
    let pool = memory_pool().await;

    users::store_demographics(
        &pool,
        "kai",
        &Demographics {
            age: None,
            gender: String::new(),
            education: String::new(),
        },
    )
    .await
    .unwrap();

    // Both increments must land even when the calls race
    let (a, b) = tokio::join!(
        users::increase_limit(&pool, "kai", 10, 5),
        users::increase_limit(&pool, "kai", 10, 5),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(
        users::get_limit_override(&pool, "kai").await.unwrap(),
        Some(20)
    );
}

#[tokio::test]
async fn evaluation_rows_feed_counts_and_recent_view() {
    let pool = memory_pool().await;

    let guid = evaluations::write_evaluation(&pool, &evaluation("kai", "a_gpt.jpg", "a"))
        .await
        .unwrap();
    assert!(!guid.is_empty());
    evaluations::write_evaluation(&pool, &evaluation("kai", "b_mj.jpg", "b"))
        .await
        .unwrap();
    evaluations::write_evaluation(&pool, &evaluation("mei", "a_gpt.jpg", "a"))
        .await
        .unwrap();

    assert_eq!(
        evaluations::user_evaluation_count(&pool, "kai").await.unwrap(),
        2
    );
    assert_eq!(
        evaluations::user_evaluation_count(&pool, "nobody").await.unwrap(),
        0
    );

    let counts = evaluations::image_rating_counts(&pool).await.unwrap();
    assert_eq!(counts.get("a_gpt.jpg"), Some(&2));
    assert_eq!(counts.get("b_mj.jpg"), Some(&1));

    let recent = evaluations::recent_evaluations(&pool, 2).await.unwrap();
    assert_eq!(recent.len(), 2);
}

#[tokio::test]
async fn seen_titles_are_durable_and_idempotent() {
    let pool = memory_pool().await;

    seen::record_seen_title(&pool, "kai", "spring-dawn").await.unwrap();
    seen::record_seen_title(&pool, "kai", "spring-dawn").await.unwrap();
    seen::record_seen_title(&pool, "kai", "river-snow").await.unwrap();
    seen::record_seen_title(&pool, "mei", "river-snow").await.unwrap();

    let kai = seen::load_seen_titles(&pool, "kai").await.unwrap();
    assert_eq!(kai.len(), 2);
    assert!(kai.contains("spring-dawn"));

    let mei = seen::load_seen_titles(&pool, "mei").await.unwrap();
    assert_eq!(mei.len(), 1);
}
