//! Error types for CLI operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur while invoking the switch CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// The transport process could not be spawned.
    #[error("Failed to invoke CLI on '{host}': {source}")]
    Spawn {
        /// Switch the invocation was addressed to.
        host: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The CLI wrote to stderr or exited non-zero.
    #[error("CLI command failed on '{host}': '{command}' (exit code {exit_code}): {stderr}")]
    CommandFailed {
        /// Switch the invocation was addressed to.
        host: String,
        /// The command, with secrets redacted.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Captured stderr (or stdout when stderr was empty).
        stderr: String,
    },

    /// The invocation exceeded the per-command deadline.
    #[error("CLI command timed out on '{host}' after {timeout:?}: '{command}'")]
    Timeout {
        host: String,
        command: String,
        timeout: Duration,
    },

    /// A mutation returned output that is neither a success nor a no-op marker.
    #[error("Unexpected CLI output for '{command}': {output}")]
    UnexpectedOutput { command: String, output: String },

    /// The run was cancelled before the command was issued.
    #[error("CLI invocation cancelled")]
    Cancelled,
}

impl CliError {
    /// Creates an unexpected output error.
    pub fn unexpected_output(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::UnexpectedOutput {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Returns true if the failure came from the transport or the CLI itself,
    /// as opposed to cancellation.
    pub fn is_transport(&self) -> bool {
        !matches!(self, CliError::Cancelled)
    }

    /// Text suitable for the `exception` field of a report envelope.
    pub fn detail(&self) -> String {
        match self {
            CliError::CommandFailed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}
