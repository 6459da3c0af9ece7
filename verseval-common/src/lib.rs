//! # VersEval Common Library
//!
//! Shared code for the VersEval rating service:
//! - Database schema and queries (users, evaluations, seen titles, settings)
//! - Image catalog, poem metadata, and questionnaire loading
//! - Configuration loading and root folder resolution
//! - Common error types

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod questions;

pub use error::{Error, Result};
