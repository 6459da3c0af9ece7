//! Phase-2 questionnaire definitions
//!
//! Questions live in a `questions.toml` file next to `poems.toml` in the
//! root folder. The file is required: without it clients cannot render
//! phase 2, so a missing or unparseable file is startup-fatal.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One questionnaire item shown after the poem reveal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier, also the key used in submitted answer maps
    pub id: String,
    pub text: String,
    /// Answer options; empty means free-form
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionsFile {
    #[serde(default)]
    questions: Vec<Question>,
}

/// The ordered phase-2 questionnaire, fixed at startup
#[derive(Debug, Clone)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Questionnaire file not found: {} ({})",
                path.display(),
                e
            ))
        })?;

        let file: QuestionsFile = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        if file.questions.is_empty() {
            return Err(Error::Config(format!(
                "No questions defined in {}",
                path.display()
            )));
        }

        for question in &file.questions {
            if question.id.trim().is_empty() || question.text.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Question with empty id or text in {}",
                    path.display()
                )));
            }
        }

        info!("Loaded {} questionnaire items", file.questions.len());
        Ok(Self {
            questions: file.questions,
        })
    }

    /// Questions in file order
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
