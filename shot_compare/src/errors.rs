//! Shared error types for the comparison pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompareError {
    /// A required external binary is missing from the environment. Fatal:
    /// every subsequent comparison would fail the same way.
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool invocation failed: {0}")]
    ToolFailed(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CompareError>;
