//! Per-participant state tracked by the selection engine

use crate::selection::types::ImageRecord;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// An assignment handed out but not yet confirmed by a submitted rating
#[derive(Debug, Clone)]
pub struct PendingAssignment {
    pub record: ImageRecord,
    pub assigned_at: DateTime<Utc>,
}

/// State for a single participant.
///
/// Created lazily on first contact (loaded from durable storage if the user
/// pre-exists) and kept in memory for the process lifetime.
#[derive(Debug, Clone)]
pub struct UserState {
    pub user_id: String,
    /// Poem titles already rated; drives the no-repeated-poem rule
    pub seen_titles: HashSet<String>,
    /// Image path -> in-flight assignment, subject to timeout reclamation
    pub pending: HashMap<String, PendingAssignment>,
}

impl UserState {
    pub fn new(user_id: &str, seen_titles: HashSet<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            seen_titles,
            pending: HashMap::new(),
        }
    }

    /// Record an assignment as pending
    pub fn mark_pending(&mut self, record: ImageRecord, now: DateTime<Utc>) {
        self.pending.insert(
            record.path.clone(),
            PendingAssignment { record, assigned_at: now },
        );
    }

    /// Move a pending assignment to seen; returns it, or None if the image
    /// was never pending for this user
    pub fn confirm_pending(&mut self, image_path: &str) -> Option<PendingAssignment> {
        let pending = self.pending.remove(image_path)?;
        self.seen_titles.insert(pending.record.poem_title.clone());
        Some(pending)
    }
}
