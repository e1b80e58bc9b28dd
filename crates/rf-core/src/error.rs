//! # AppError
//!
//! Centralized error handling for the Rusty-Forum ecosystem.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all rf-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Post)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Empty or malformed core field (e.g., blank title, empty reply)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Infrastructure failure (e.g., database unreachable, write failed)
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// Startup wiring failure (e.g., backend not compiled in)
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn post_not_found(id: &str) -> Self {
        AppError::NotFound("post".to_string(), id.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(..))
    }
}

/// A specialized Result type for Rusty-Forum logic.
pub type Result<T> = std::result::Result<T, AppError>;
