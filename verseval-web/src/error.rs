//! Error types for verseval-web
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Exhaustion is deliberately NOT an error variant: the engine
//! reports it as a normal outcome (`AssignOutcome::Exhausted`).

use thiserror::Error;

/// Main error type for the verseval-web service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors bubbled up from the shared library
    #[error(transparent)]
    Common(#[from] verseval_common::Error),

    /// Catalog was empty or unreadable at startup
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Caller confirmed an image that was never assigned as pending.
    /// This is a programming-contract violation, not a runtime condition.
    #[error("Image '{image_path}' is not pending for user '{user_id}'")]
    NotPending { user_id: String, image_path: String },

    /// Unknown user in an operation that requires prior contact
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using verseval-web Error
pub type Result<T> = std::result::Result<T, Error>;
