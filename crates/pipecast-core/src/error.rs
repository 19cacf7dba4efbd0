//! Error types for `PipeCast` core library.

use thiserror::Error;

/// Result type alias using `PipeCast` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `PipeCast` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
