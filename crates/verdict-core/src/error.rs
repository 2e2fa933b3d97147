//! Core error types

use thiserror::Error;

/// Core error
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A value could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
