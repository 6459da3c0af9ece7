//! Session orchestrator
//!
//! Ties the selection engine, the catalog, and the database together into
//! the two-phase evaluation flow: participants pick which of several poem
//! titles an image illustrates (phase 1), then answer a fixed set of
//! poem/image fit questions (phase 2). One confirmed evaluation per
//! submitted round.

use crate::error::{Error, Result};
use crate::selection::{AssignOutcome, SelectionEngine};
use chrono::Duration;
use rand::seq::SliceRandom;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};
use verseval_common::catalog::ImageCatalog;
use verseval_common::config::StudySettings;
use verseval_common::db::evaluations::{self, NewEvaluation};
use verseval_common::db::users::{self, Demographics};
use verseval_common::db::settings as db_settings;
use verseval_common::questions::{Question, QuestionSet};

/// One lettered phase-1 option, poem text included so the participant can
/// read all candidates before choosing
#[derive(Debug, Clone, Serialize)]
pub struct LetteredOption {
    pub letter: String,
    pub title: String,
    pub author: String,
    pub content: String,
}

/// A phase-1 round handed to the client. The target letter travels with it;
/// the client echoes it back on reveal and submit.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationItem {
    pub poem_title: String,
    pub image_path: String,
    pub image_kind: String,
    pub options: Vec<LetteredOption>,
    pub target_letter: String,
    pub remaining: i64,
}

/// What a request for the next round produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Item(EvaluationItem),
    /// Every remaining image's poem has been seen by this user
    Exhausted,
    LimitReached { limit: i64 },
}

/// Result of a session-start request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    Started {
        user_id: String,
        resumed: bool,
        remaining: i64,
        limit: i64,
        item: ItemOutcome,
    },
    /// The name belongs to someone whose recorded demographics differ
    NameTaken,
}

/// Phase-1 reveal: correctness, the full target poem, and the phase-2
/// questionnaire the client renders next
#[derive(Debug, Clone, Serialize)]
pub struct RevealData {
    pub is_correct: bool,
    pub target_letter: String,
    pub phase1_choice: String,
    pub title: String,
    pub author: String,
    pub content: String,
    pub questions: Vec<Question>,
}

/// A complete round submission from the client
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: String,
    pub poem_title: String,
    pub image_path: String,
    pub image_kind: String,
    pub phase1_choice: String,
    pub phase1_response_ms: i64,
    pub phase2_answers: serde_json::Value,
    pub phase2_response_ms: i64,
    pub total_response_ms: i64,
}

/// Result of a submission: the recorded row's guid plus the next round
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResult {
    /// Guid of the recorded evaluation row; absent when nothing was recorded
    pub guid: Option<String>,
    pub remaining: i64,
    pub next: ItemOutcome,
}

/// Orchestrates evaluation sessions over the shared engine and catalog
pub struct SessionManager {
    db: SqlitePool,
    engine: Arc<SelectionEngine>,
    catalog: Arc<ImageCatalog>,
    questions: Arc<QuestionSet>,
    settings: StudySettings,
}

impl SessionManager {
    pub fn new(
        db: SqlitePool,
        engine: Arc<SelectionEngine>,
        catalog: Arc<ImageCatalog>,
        questions: Arc<QuestionSet>,
        settings: StudySettings,
    ) -> Self {
        Self {
            db,
            engine,
            catalog,
            questions,
            settings,
        }
    }

    /// The phase-2 questionnaire served to clients
    pub fn questions(&self) -> &[Question] {
        self.questions.questions()
    }

    /// Effective quota for a user: personal override or the study default
    async fn limit_for(&self, user_id: &str) -> Result<i64> {
        Ok(users::get_limit_override(&self.db, user_id)
            .await?
            .unwrap_or(self.settings.max_evaluations_per_user))
    }

    /// Evaluations a user may still submit, never negative
    pub async fn remaining(&self, user_id: &str) -> Result<(i64, i64)> {
        let limit = self.limit_for(user_id).await?;
        let done = evaluations::user_evaluation_count(&self.db, user_id).await?;
        Ok(((limit - done).max(0), limit))
    }

    /// Start or resume a session.
    ///
    /// A known user id resumes only when the supplied demographics match the
    /// recorded ones; otherwise the name is taken. New users get their
    /// demographics stored before the first round is assigned.
    pub async fn start_session(
        &self,
        user_id: &str,
        demographics: &Demographics,
    ) -> Result<StartOutcome> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::BadRequest("User id must not be empty".to_string()));
        }

        let resumed = match users::get_demographics(&self.db, user_id).await? {
            Some(existing) => {
                if !existing.matches(demographics) {
                    info!("Session start refused: name '{}' already taken", user_id);
                    return Ok(StartOutcome::NameTaken);
                }
                true
            }
            None => {
                users::store_demographics(&self.db, user_id, demographics).await?;
                false
            }
        };

        let (remaining, limit) = self.remaining(user_id).await?;
        info!(
            "Session {} for '{}': {} of {} evaluations remaining",
            if resumed { "resumed" } else { "started" },
            user_id,
            remaining,
            limit
        );

        let item = self.next_item(user_id).await?;
        Ok(StartOutcome::Started {
            user_id: user_id.to_string(),
            resumed,
            remaining,
            limit,
            item,
        })
    }

    /// Produce the next phase-1 round for a user.
    ///
    /// Reclaims expired assignments first, then asks the engine for the
    /// least-rated unseen image and dresses it up with shuffled lettered
    /// title options (target + distractors).
    pub async fn next_item(&self, user_id: &str) -> Result<ItemOutcome> {
        let (remaining, limit) = self.remaining(user_id).await?;
        if remaining <= 0 {
            return Ok(ItemOutcome::LimitReached { limit });
        }

        self.engine
            .reclaim_timeouts(Duration::minutes(self.settings.assignment_timeout_minutes))
            .await;

        let record = match self.engine.assign(user_id).await? {
            AssignOutcome::Assigned(record) => record,
            AssignOutcome::Exhausted => return Ok(ItemOutcome::Exhausted),
        };

        let distractors = self
            .catalog
            .distractors(&record.poem_title, self.settings.distractor_count)
            .map_err(|e| Error::Catalog(e.to_string()))?;

        let mut titles: Vec<String> = Vec::with_capacity(distractors.len() + 1);
        titles.push(record.poem_title.clone());
        titles.extend(distractors);
        titles.shuffle(&mut rand::thread_rng());

        let mut target_letter = String::new();
        let options: Vec<LetteredOption> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                let letter = char::from(b'A' + i as u8).to_string();
                if title == &record.poem_title {
                    target_letter = letter.clone();
                }
                let poem = self.catalog.poem(title);
                LetteredOption {
                    letter,
                    title: title.clone(),
                    author: poem.map(|p| p.author.clone()).unwrap_or_default(),
                    content: poem.map(|p| p.content.clone()).unwrap_or_default(),
                }
            })
            .collect();

        debug!(
            "Round for '{}': image '{}', target letter {}",
            user_id, record.path, target_letter
        );

        Ok(ItemOutcome::Item(EvaluationItem {
            poem_title: record.poem_title,
            image_path: record.path,
            image_kind: record.kind,
            options,
            target_letter,
            remaining,
        }))
    }

    /// Reveal the target poem after the phase-1 choice
    pub fn reveal(
        &self,
        poem_title: &str,
        target_letter: &str,
        phase1_choice: &str,
    ) -> Result<RevealData> {
        if phase1_choice.trim().is_empty() {
            return Err(Error::BadRequest(
                "A phase-1 choice is required before reveal".to_string(),
            ));
        }

        let poem = self.catalog.poem(poem_title);
        Ok(RevealData {
            is_correct: phase1_choice == target_letter,
            target_letter: target_letter.to_string(),
            phase1_choice: phase1_choice.to_string(),
            title: poem_title.to_string(),
            author: poem.map(|p| p.author.clone()).unwrap_or_default(),
            content: poem.map(|p| p.content.clone()).unwrap_or_default(),
            questions: self.questions.questions().to_vec(),
        })
    }

    /// Record a completed round and hand out the next one.
    ///
    /// Validates the submission, writes the evaluation row with the user's
    /// demographics snapshot, confirms the assignment with the engine, then
    /// produces the next item (or exhausted / limit-reached).
    pub async fn submit_evaluation(&self, submission: Submission) -> Result<SubmitResult> {
        let user_id = submission.user_id.trim();
        if user_id.is_empty() {
            return Err(Error::BadRequest("User id must not be empty".to_string()));
        }
        if submission.phase1_choice.trim().is_empty() {
            return Err(Error::BadRequest(
                "A phase-1 choice is required".to_string(),
            ));
        }
        let answer_count = submission
            .phase2_answers
            .as_object()
            .map(|m| m.len())
            .ok_or_else(|| {
                Error::BadRequest("phase2_answers must be a JSON object".to_string())
            })?;
        if answer_count < self.settings.phase2_question_count {
            return Err(Error::BadRequest(format!(
                "All {} phase-2 questions must be answered (got {})",
                self.settings.phase2_question_count, answer_count
            )));
        }

        let demographics = users::get_demographics(&self.db, user_id)
            .await?
            .ok_or_else(|| Error::UnknownUser(user_id.to_string()))?;

        let (remaining, limit) = self.remaining(user_id).await?;
        if remaining <= 0 {
            return Ok(SubmitResult {
                guid: None,
                remaining: 0,
                next: ItemOutcome::LimitReached { limit },
            });
        }

        // Confirm before the durable write: a stale submission (assignment
        // reclaimed after timeout, or never made) must not leave an
        // evaluation row that would inflate the rating count on restart.
        self.engine.confirm(user_id, &submission.image_path).await?;

        let guid = evaluations::write_evaluation(
            &self.db,
            &NewEvaluation {
                user_id: user_id.to_string(),
                age: demographics.age,
                gender: demographics.gender,
                education: demographics.education,
                poem_title: submission.poem_title.clone(),
                image_path: submission.image_path.clone(),
                image_kind: submission.image_kind.clone(),
                phase1_choice: submission.phase1_choice.clone(),
                phase1_response_ms: submission.phase1_response_ms,
                phase2_answers: submission.phase2_answers.clone(),
                phase2_response_ms: submission.phase2_response_ms,
                total_response_ms: submission.total_response_ms,
            },
        )
        .await?;

        let (remaining, _) = self.remaining(user_id).await?;
        info!(
            "Evaluation {} recorded for '{}' ({} remaining)",
            guid, user_id, remaining
        );

        let next = self.next_item(user_id).await?;
        Ok(SubmitResult {
            guid: Some(guid),
            remaining,
            next,
        })
    }

    /// Bump a user's personal quota by the configured step
    pub async fn increase_limit(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.trim();
        if users::get_demographics(&self.db, user_id).await?.is_none() {
            return Err(Error::UnknownUser(user_id.to_string()));
        }

        let step = db_settings::get_setting_i64(&self.db, "limit_increase_step")
            .await?
            .unwrap_or(5);
        let new_limit = users::increase_limit(
            &self.db,
            user_id,
            self.settings.max_evaluations_per_user,
            step,
        )
        .await?;

        info!("Quota for '{}' raised to {}", user_id, new_limit);
        Ok(new_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::fs;
    use tempfile::TempDir;
    use verseval_common::db::init;

    async fn test_pool() -> SqlitePool {
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

    fn test_catalog(dir: &TempDir) -> ImageCatalog {
        let images = dir.path().join("images");
        fs::create_dir(&images).unwrap();
        for name in [
            "alpha_gpt.jpg",
            "beta_mj.png",
            "gamma_nano.jpg",
            "delta_seedream.png",
        ] {
            fs::write(images.join(name), b"x").unwrap();
        }
        fs::write(
            dir.path().join("poems.toml"),
            r#"
[[poems]]
title = "alpha"
author = "A"
content = "first poem"

[[poems]]
title = "beta"
author = "B"
content = "second poem"

[[poems]]
title = "gamma"
author = "C"
content = "third poem"

[[poems]]
title = "delta"
author = "D"
content = "fourth poem"
"#,
        )
        .unwrap();
        ImageCatalog::load(&images, &dir.path().join("poems.toml")).unwrap()
    }

    fn test_questions(dir: &TempDir) -> QuestionSet {
        let path = dir.path().join("questions.toml");
        let mut content = String::new();
        for i in 1..=12 {
            content.push_str(&format!(
                "[[questions]]\nid = \"q{}\"\ntext = \"question {}\"\noptions = [\"yes\", \"no\"]\n\n",
                i, i
            ));
        }
        fs::write(&path, content).unwrap();
        QuestionSet::load(&path).unwrap()
    }

    async fn manager(dir: &TempDir, settings: StudySettings) -> SessionManager {
        let pool = test_pool().await;
        let catalog = Arc::new(test_catalog(dir));
        let questions = Arc::new(test_questions(dir));
        let engine = Arc::new(SelectionEngine::load(&catalog, pool.clone()).await.unwrap());
        SessionManager::new(pool, engine, catalog, questions, settings)
    }

    fn demo() -> Demographics {
        Demographics {
            age: Some(30),
            gender: "f".to_string(),
            education: "ba".to_string(),
        }
    }

    fn answers(n: usize) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = (1..=n)
            .map(|i| (format!("q{}", i), serde_json::json!("yes")))
            .collect();
        serde_json::Value::Object(map)
    }

    fn submission_for(item: &EvaluationItem, user_id: &str, n_answers: usize) -> Submission {
        Submission {
            user_id: user_id.to_string(),
            poem_title: item.poem_title.clone(),
            image_path: item.image_path.clone(),
            image_kind: item.image_kind.clone(),
            phase1_choice: item.target_letter.clone(),
            phase1_response_ms: 1200,
            phase2_answers: answers(n_answers),
            phase2_response_ms: 8000,
            total_response_ms: 9200,
        }
    }

    #[tokio::test]
    async fn start_session_assigns_lettered_options() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        let outcome = mgr.start_session("lina", &demo()).await.unwrap();
        let StartOutcome::Started {
            resumed,
            remaining,
            limit,
            item,
            ..
        } = outcome
        else {
            panic!("expected a started session");
        };
        assert!(!resumed);
        assert_eq!(remaining, 10);
        assert_eq!(limit, 10);

        let ItemOutcome::Item(item) = item else {
            panic!("expected a first round");
        };
        assert_eq!(item.options.len(), 4);

        let letters: Vec<&str> = item.options.iter().map(|o| o.letter.as_str()).collect();
        assert_eq!(letters, vec!["A", "B", "C", "D"]);

        // The target letter points at the assigned poem
        let target = item
            .options
            .iter()
            .find(|o| o.letter == item.target_letter)
            .unwrap();
        assert_eq!(target.title, item.poem_title);
        assert!(!target.content.is_empty());
    }

    #[tokio::test]
    async fn empty_user_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        assert!(matches!(
            mgr.start_session("   ", &demo()).await,
            Err(Error::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn matching_demographics_resume_mismatch_is_name_taken() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        mgr.start_session("lina", &demo()).await.unwrap();

        let outcome = mgr.start_session("lina", &demo()).await.unwrap();
        assert!(matches!(outcome, StartOutcome::Started { resumed: true, .. }));

        let other = Demographics {
            age: Some(31),
            ..demo()
        };
        let outcome = mgr.start_session("lina", &other).await.unwrap();
        assert!(matches!(outcome, StartOutcome::NameTaken));
    }

    #[tokio::test]
    async fn reveal_reports_correctness_and_poem_text() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        let correct = mgr.reveal("alpha", "B", "B").unwrap();
        assert!(correct.is_correct);
        assert_eq!(correct.author, "A");
        assert_eq!(correct.content, "first poem");
        assert_eq!(correct.questions.len(), 12);
        assert_eq!(correct.questions[0].id, "q1");

        let wrong = mgr.reveal("alpha", "B", "C").unwrap();
        assert!(!wrong.is_correct);

        assert!(matches!(
            mgr.reveal("alpha", "B", ""),
            Err(Error::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn incomplete_phase2_answers_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        let StartOutcome::Started {
            item: ItemOutcome::Item(item),
            ..
        } = mgr.start_session("lina", &demo()).await.unwrap()
        else {
            panic!("expected a first round");
        };

        let result = mgr
            .submit_evaluation(submission_for(&item, "lina", 3))
            .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn submit_records_row_and_hands_out_next_round() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        let StartOutcome::Started {
            item: ItemOutcome::Item(item),
            ..
        } = mgr.start_session("lina", &demo()).await.unwrap()
        else {
            panic!("expected a first round");
        };

        let result = mgr
            .submit_evaluation(submission_for(&item, "lina", 12))
            .await
            .unwrap();
        assert!(result.guid.is_some());
        assert_eq!(result.remaining, 9);

        let ItemOutcome::Item(next) = result.next else {
            panic!("expected a next round");
        };
        assert_ne!(next.poem_title, item.poem_title);

        let count = evaluations::user_evaluation_count(&mgr.db, "lina")
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn late_submission_after_reclaim_leaves_no_row() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        let StartOutcome::Started {
            item: ItemOutcome::Item(item),
            ..
        } = mgr.start_session("lina", &demo()).await.unwrap()
        else {
            panic!("expected a first round");
        };

        // Zero timeout: the assignment is immediately reclaimable
        assert_eq!(mgr.engine.reclaim_timeouts(Duration::zero()).await, 1);

        // The stale submission is refused and must not be recorded
        let result = mgr
            .submit_evaluation(submission_for(&item, "lina", 12))
            .await;
        assert!(matches!(result, Err(Error::NotPending { .. })));

        let count = evaluations::user_evaluation_count(&mgr.db, "lina")
            .await
            .unwrap();
        assert_eq!(count, 0);

        // The image stayed at rating 0 and is assignable again
        let stats = mgr.engine.statistics().await;
        assert_eq!(stats.total_ratings, 0);
        assert!(matches!(
            mgr.next_item("lina").await.unwrap(),
            ItemOutcome::Item(_)
        ));
    }

    #[tokio::test]
    async fn exhaustion_after_all_poems_rated() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        let StartOutcome::Started { item, .. } = mgr.start_session("lina", &demo()).await.unwrap()
        else {
            panic!("expected a started session");
        };

        // Four poems in the catalog; the fourth submission exhausts them
        let mut current = item;
        for _ in 0..4 {
            let ItemOutcome::Item(item) = current else {
                panic!("expected a round");
            };
            let result = mgr
                .submit_evaluation(submission_for(&item, "lina", 12))
                .await
                .unwrap();
            current = result.next;
        }
        assert!(matches!(current, ItemOutcome::Exhausted));
    }

    #[tokio::test]
    async fn limit_reached_and_increase_limit() {
        let dir = TempDir::new().unwrap();
        let settings = StudySettings {
            max_evaluations_per_user: 1,
            ..StudySettings::default()
        };
        let mgr = manager(&dir, settings).await;

        let StartOutcome::Started {
            item: ItemOutcome::Item(item),
            ..
        } = mgr.start_session("lina", &demo()).await.unwrap()
        else {
            panic!("expected a first round");
        };

        let result = mgr
            .submit_evaluation(submission_for(&item, "lina", 12))
            .await
            .unwrap();
        assert_eq!(result.remaining, 0);
        assert!(matches!(result.next, ItemOutcome::LimitReached { limit: 1 }));

        let new_limit = mgr.increase_limit("lina").await.unwrap();
        assert_eq!(new_limit, 6);

        let (remaining, limit) = mgr.remaining("lina").await.unwrap();
        assert_eq!(limit, 6);
        assert_eq!(remaining, 5);

        assert!(matches!(
            mgr.next_item("lina").await.unwrap(),
            ItemOutcome::Item(_)
        ));
    }

    #[tokio::test]
    async fn increase_limit_for_unknown_user_fails() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, StudySettings::default()).await;

        assert!(matches!(
            mgr.increase_limit("ghost").await,
            Err(Error::UnknownUser(_))
        ));
    }
}
