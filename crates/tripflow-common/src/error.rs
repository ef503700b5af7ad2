//! Error types shared across Tripflow crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared types
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid period '{input}': {reason}")]
    InvalidPeriod { input: String, reason: String },
}
