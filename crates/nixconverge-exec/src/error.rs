//! Error types for nixconverge-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running a process
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Process could not be started
    #[error("failed to spawn `{program}`: {message}")]
    SpawnError {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        message: String,
    },

    /// I/O error while collecting output
    #[error("I/O error: {0}")]
    IoError(String),

    /// Process did not finish in time and was killed
    #[error("`{program}` timed out after {timeout:?}")]
    Timeout {
        /// Program that was killed
        program: String,
        /// Timeout duration that was exceeded
        timeout: Duration,
    },
}

impl ExecError {
    /// Check if error is retryable
    ///
    /// A program that cannot be spawned will not appear on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecError::SpawnError { .. })
    }
}
