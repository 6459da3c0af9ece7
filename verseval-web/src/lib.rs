//! VersEval rating service
//!
//! Serves an image/poem rating study: each participant is handed the
//! globally least-rated image whose poem they have not yet seen, rates it
//! through a two-phase questionnaire, and the result is recorded durably.
//!
//! Exposed as a library so integration tests can drive the router and the
//! selection engine in-process.

pub mod api;
pub mod error;
pub mod selection;
pub mod session;

pub use error::{Error, Result};
