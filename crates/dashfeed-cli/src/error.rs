//! CLI error types.

use dashfeed_core::OutputError;
use dashfeed_providers::ProviderError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a run with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication or another provider step failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The feed could not be written.
    #[error(transparent)]
    Output(#[from] OutputError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
