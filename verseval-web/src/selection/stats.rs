//! Statistics and introspection snapshots
//!
//! Read-only views for operational dashboards; none of this affects
//! selection correctness.

use serde::Serialize;

/// Aggregate snapshot of the engine state
#[derive(Debug, Clone, Serialize)]
pub struct SelectionStats {
    pub total_images: usize,
    pub total_ratings: u64,
    pub images_with_5_plus_ratings: usize,
    pub images_with_0_4_ratings: usize,
    pub min_ratings_per_image: u32,
    pub max_ratings_per_image: u32,
    pub mean_ratings_per_image: f64,
    pub median_ratings_per_image: u32,
    pub queue_depth: usize,
    pub active_users: usize,
    pub pending_assignments: usize,
}

/// Per-image view for the admin queue page
#[derive(Debug, Clone, Serialize)]
pub struct QueueImageState {
    pub path: String,
    pub poem_title: String,
    pub rating: u32,
    /// Users currently pending on this image (at most one, by invariant)
    pub pending_for: Vec<String>,
}
