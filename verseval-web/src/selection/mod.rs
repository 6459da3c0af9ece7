//! Image selection subsystem
//!
//! Hands each participant the globally least-rated image whose poem they
//! have not yet seen, tracks in-flight assignments, and reclaims abandoned
//! ones. All shared state lives behind one exclusive lock in
//! [`engine::SelectionEngine`].

pub mod engine;
pub mod stats;
pub mod types;
pub mod user_state;

pub use engine::SelectionEngine;
pub use stats::{QueueImageState, SelectionStats};
pub use types::{AssignOutcome, ImageRecord};
