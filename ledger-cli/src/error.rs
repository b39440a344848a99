//! Structured error types for the ledger CLI

use lib_ledger::{ConfigError, ErrorKind, LedgerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger operation failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output formatting error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Whether resubmitting the same command may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CliError::Ledger(err) if err.is_retryable())
    }

    /// Process exit code: 2 for bad input, 3 for retryable storage conditions, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidInput(_) | CliError::Config(_) => 2,
            CliError::Ledger(err) => match err.kind() {
                ErrorKind::InvalidArgument => 2,
                ErrorKind::Retryable | ErrorKind::Unavailable => 3,
                ErrorKind::Rejected | ErrorKind::Corrupt => 1,
            },
            CliError::Serialization(_) | CliError::Io(_) => 1,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
