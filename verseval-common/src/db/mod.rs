//! Database layer: schema initialization and queries
//!
//! Two durable concerns live here:
//! - the evaluation log (one row per confirmed rating), which is also the
//!   source of truth for per-image rating counts across restarts
//! - per-user state (demographics, quota overrides, seen poem titles)

pub mod evaluations;
pub mod init;
pub mod seen;
pub mod settings;
pub mod users;

pub use init::init_database;
