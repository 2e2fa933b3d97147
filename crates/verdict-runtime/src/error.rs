//! Runtime error types

use thiserror::Error;

/// Runtime error
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Sensitive-data failure (hashing or encryption); fatal for the request
    #[error("Sensitive data error: {0}")]
    Sensitive(String),

    /// Reference or audit store failure; the evaluation cannot proceed
    /// because the score would be materially wrong
    #[error("Store error: {0}")]
    Store(String),

    /// Cache layer failure; treated as a miss by callers
    #[error("Cache error: {0}")]
    Cache(String),

    /// Velocity counter failure
    #[error("Velocity counter error: {0}")]
    Velocity(String),

    /// External collaborator failure (DNS, geolocation, WHOIS, page fetch);
    /// checks degrade silently on this
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Feed download or parse failure during refresh
    #[error("Feed error: {0}")]
    Feed(String),

    /// Input rejected before evaluation started
    #[error("Invalid input")]
    InvalidInput(Vec<verdict_core::FieldError>),

    /// A check raised an internal error; captured per check, never fatal
    #[error("Check error: {0}")]
    Check(String),

    /// A long-running job exceeded its deadline
    #[error("Deadline exceeded after {0} ms")]
    Deadline(u64),

    /// Invalid engine configuration; fatal at boot
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RuntimeError {
    fn from(err: sqlx::Error) -> Self {
        RuntimeError::Store(err.to_string())
    }
}

impl From<redis::RedisError> for RuntimeError {
    fn from(err: redis::RedisError) -> Self {
        RuntimeError::Velocity(err.to_string())
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
