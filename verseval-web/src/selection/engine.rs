//! Selection engine
//!
//! A min-priority queue over `(rating_count, tie_breaker, image)` hands out
//! the least-rated image a given user has not yet seen. The queue uses lazy
//! deletion: entries are never mutated in place; a popped entry whose
//! recorded count differs from the rating ledger is simply discarded.
//!
//! Concurrency discipline: every operation runs under one exclusive
//! `tokio::sync::Mutex` covering the queue, the ledger, and all user state.
//! No fine-grained locks, no deadlock possibility. The only I/O performed
//! while holding the lock is the seen-set write in [`SelectionEngine::confirm`]
//! and the lazy user-state load on first contact.

use crate::error::{Error, Result};
use crate::selection::stats::{QueueImageState, SelectionStats};
use crate::selection::types::{AssignOutcome, ImageRecord, QueueSlot};
use crate::selection::user_state::UserState;
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::SqlitePool;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use verseval_common::catalog::ImageCatalog;
use verseval_common::db::{evaluations, seen};

/// Everything guarded by the engine lock
struct EngineState {
    /// Min-heap of (rating, tie_breaker, record); may hold stale entries
    queue: BinaryHeap<Reverse<QueueSlot>>,
    /// Authoritative rating count per image path
    ratings: HashMap<String, u32>,
    /// Tie-breakers fixed at load time, reused on every reinsertion
    tie_breakers: HashMap<String, u64>,
    /// Per-participant state, keyed by user id
    users: HashMap<String, UserState>,
    /// The full image set, fixed at load time
    images: Vec<ImageRecord>,
}

/// Shared selection engine. One instance per process, injected into the
/// session layer; tests create fresh instances with their own pools.
pub struct SelectionEngine {
    state: Mutex<EngineState>,
    db: SqlitePool,
}

impl SelectionEngine {
    /// Build the engine from the startup catalog.
    ///
    /// The rating ledger is synced from the durable evaluation counts so
    /// priorities survive restarts. Images are shuffled before the initial
    /// push and each gets a random tie-breaker, so equal-count images are
    /// served in a stable shuffled order rather than catalog order.
    pub async fn load(catalog: &ImageCatalog, db: SqlitePool) -> Result<Self> {
        let records: Vec<ImageRecord> = catalog
            .entries()
            .iter()
            .map(|e| ImageRecord {
                path: e.path.clone(),
                poem_title: e.poem_title.clone(),
                kind: e.kind.clone(),
            })
            .collect();

        Self::from_records(records, db).await
    }

    /// Lower-level constructor used by `load` and by tests
    pub async fn from_records(mut records: Vec<ImageRecord>, db: SqlitePool) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Catalog(
                "Refusing to start with an empty image catalog".to_string(),
            ));
        }

        let counts = evaluations::image_rating_counts(&db).await?;

        let mut rng = rand::thread_rng();
        records.shuffle(&mut rng);

        let mut queue = BinaryHeap::with_capacity(records.len());
        let mut ratings = HashMap::with_capacity(records.len());
        let mut tie_breakers = HashMap::with_capacity(records.len());

        for record in &records {
            let rating = counts.get(&record.path).copied().unwrap_or(0);
            let tie_breaker: u64 = rng.gen();
            ratings.insert(record.path.clone(), rating);
            tie_breakers.insert(record.path.clone(), tie_breaker);
            queue.push(Reverse(QueueSlot {
                rating,
                tie_breaker,
                record: record.clone(),
            }));
        }

        info!(
            "Selection engine loaded: {} images, {} with prior ratings",
            records.len(),
            counts.len()
        );

        Ok(Self {
            state: Mutex::new(EngineState {
                queue,
                ratings,
                tie_breakers,
                users: HashMap::new(),
                images: records,
            }),
            db,
        })
    }

    /// Assign the least-rated image whose poem this user has not seen.
    ///
    /// Pops entries until a usable one is found. Stale entries (ledger
    /// mismatch) and entries already examined in this call are discarded;
    /// entries skipped because the user saw their poem are remembered and
    /// reinserted before returning. Bounded at 2x the queue size so
    /// adversarial staleness cannot loop forever.
    pub async fn assign(&self, user_id: &str) -> Result<AssignOutcome> {
        let mut guard = self.state.lock().await;

        if !guard.users.contains_key(user_id) {
            let seen_titles = seen::load_seen_titles(&self.db, user_id).await?;
            debug!(
                "First contact for user '{}' ({} titles already seen)",
                user_id,
                seen_titles.len()
            );
            guard
                .users
                .insert(user_id.to_string(), UserState::new(user_id, seen_titles));
        }

        let state = &mut *guard;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::Internal("user state vanished under lock".to_string()))?;

        let max_attempts = state.queue.len() * 2;
        let mut attempts = 0;
        let mut examined: HashSet<String> = HashSet::new();
        let mut skipped: Vec<QueueSlot> = Vec::new();

        let outcome = loop {
            if attempts >= max_attempts {
                break AssignOutcome::Exhausted;
            }
            let Some(Reverse(slot)) = state.queue.pop() else {
                break AssignOutcome::Exhausted;
            };
            attempts += 1;

            // Stale entry: the image was rated since this entry was pushed.
            // Discard; the fresh entry is already in the queue.
            let current = state.ratings.get(&slot.record.path).copied().unwrap_or(0);
            if slot.rating != current {
                continue;
            }

            // Cycle guard: already examined in this call
            if examined.contains(&slot.record.path) {
                continue;
            }

            if user.seen_titles.contains(&slot.record.poem_title) {
                // Conflict: reinsert later so other users can still get it
                examined.insert(slot.record.path.clone());
                skipped.push(slot);
                continue;
            }

            user.mark_pending(slot.record.clone(), Utc::now());
            break AssignOutcome::Assigned(slot.record);
        };

        for slot in skipped {
            state.queue.push(Reverse(slot));
        }

        if let AssignOutcome::Assigned(ref record) = outcome {
            debug!(
                "Assigned '{}' (poem '{}') to user '{}'",
                record.path, record.poem_title, user_id
            );
        } else {
            info!("User '{}' has exhausted all available poems", user_id);
        }

        Ok(outcome)
    }

    /// Confirm that a pending assignment was rated.
    ///
    /// Marks the poem as seen (persisted synchronously while the lock is
    /// held), increments the ledger by exactly 1, and pushes a fresh entry.
    /// Confirming an image that is not pending for this user is a
    /// programming-contract violation and returns an error.
    pub async fn confirm(&self, user_id: &str, image_path: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::UnknownUser(user_id.to_string()))?;

        let pending = user.confirm_pending(image_path).ok_or_else(|| Error::NotPending {
            user_id: user_id.to_string(),
            image_path: image_path.to_string(),
        })?;

        let poem_title = pending.record.poem_title.clone();

        // Synchronous durable write under the lock: a crash after this point
        // can never resurface a seen poem for this user.
        seen::record_seen_title(&self.db, user_id, &poem_title).await?;

        let new_rating = state.ratings.get(image_path).copied().unwrap_or(0) + 1;
        state.ratings.insert(image_path.to_string(), new_rating);

        let tie_breaker = state.tie_breakers.get(image_path).copied().unwrap_or(0);
        state.queue.push(Reverse(QueueSlot {
            rating: new_rating,
            tie_breaker,
            record: pending.record,
        }));

        debug!(
            "Confirmed '{}' for user '{}' (rating now {})",
            image_path, user_id, new_rating
        );

        Ok(())
    }

    /// Return every pending assignment older than `timeout` to the queue.
    ///
    /// Reinserted at the image's *current* ledger count: the image was never
    /// actually rated, so its priority is unchanged. Returns the number of
    /// assignments reclaimed.
    pub async fn reclaim_timeouts(&self, timeout: Duration) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Utc::now();
        let mut reclaimed = 0;

        for user in state.users.values_mut() {
            let expired: Vec<String> = user
                .pending
                .iter()
                .filter(|(_, p)| now - p.assigned_at > timeout)
                .map(|(path, _)| path.clone())
                .collect();

            for path in expired {
                if let Some(pending) = user.pending.remove(&path) {
                    let rating = state.ratings.get(&path).copied().unwrap_or(0);
                    let tie_breaker = state.tie_breakers.get(&path).copied().unwrap_or(0);
                    state.queue.push(Reverse(QueueSlot {
                        rating,
                        tie_breaker,
                        record: pending.record,
                    }));
                    warn!(
                        "Reclaimed '{}' from user '{}' after timeout",
                        path, user.user_id
                    );
                    reclaimed += 1;
                }
            }
        }

        reclaimed
    }

    /// Aggregate statistics snapshot
    pub async fn statistics(&self) -> SelectionStats {
        let guard = self.state.lock().await;

        let counts: Vec<u32> = guard.ratings.values().copied().collect();
        let total_ratings: u64 = counts.iter().map(|&c| c as u64).sum();
        let images_with_5_plus = counts.iter().filter(|&&c| c >= 5).count();

        let (min, max, mean, median) = if counts.is_empty() {
            (0, 0, 0.0, 0)
        } else {
            let mut sorted = counts.clone();
            sorted.sort_unstable();
            (
                sorted[0],
                sorted[sorted.len() - 1],
                total_ratings as f64 / sorted.len() as f64,
                sorted[sorted.len() / 2],
            )
        };

        SelectionStats {
            total_images: guard.images.len(),
            total_ratings,
            images_with_5_plus_ratings: images_with_5_plus,
            images_with_0_4_ratings: counts.len() - images_with_5_plus,
            min_ratings_per_image: min,
            max_ratings_per_image: max,
            mean_ratings_per_image: mean,
            median_ratings_per_image: median,
            queue_depth: guard.queue.len(),
            active_users: guard.users.len(),
            pending_assignments: guard.users.values().map(|u| u.pending.len()).sum(),
        }
    }

    /// Per-image snapshot for the admin queue view, sorted by rating
    pub async fn queue_snapshot(&self) -> Vec<QueueImageState> {
        let guard = self.state.lock().await;

        let mut snapshot: Vec<QueueImageState> = guard
            .images
            .iter()
            .map(|record| {
                let pending_for: Vec<String> = guard
                    .users
                    .values()
                    .filter(|u| u.pending.contains_key(&record.path))
                    .map(|u| u.user_id.clone())
                    .collect();
                QueueImageState {
                    path: record.path.clone(),
                    poem_title: record.poem_title.clone(),
                    rating: guard.ratings.get(&record.path).copied().unwrap_or(0),
                    pending_for,
                }
            })
            .collect();

        snapshot.sort_by(|a, b| a.rating.cmp(&b.rating).then_with(|| a.path.cmp(&b.path)));
        snapshot
    }
}
