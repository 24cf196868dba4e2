//! Error types for nixconverge-nix

use std::fmt;
use std::time::Duration;

use nixconverge_exec::ExecError;
use thiserror::Error;

/// Which switch hook failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreSwitch,
    PostSwitch,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::PreSwitch => write!(f, "pre-switch"),
            HookStage::PostSwitch => write!(f, "post-switch"),
        }
    }
}

/// Errors that can occur during toolchain operations
///
/// Hook command text never appears in these messages.
#[derive(Error, Debug, Clone)]
pub enum ToolchainError {
    /// Process could not be run at all
    #[error("execution error: {0}")]
    Exec(#[from] ExecError),

    /// Tool exited non-zero
    #[error("`{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        /// Command line, without secrets
        command: String,
        /// Exit status
        status: i32,
        /// Captured stderr, trimmed
        stderr: String,
    },

    /// No session could be established within the budget
    #[error("timed out after {timeout:?} waiting for ssh on {user}@{host}")]
    Unreachable {
        /// Target user
        user: String,
        /// Target host
        host: String,
        /// Budget that was exhausted
        timeout: Duration,
    },

    /// Tool output could not be interpreted
    #[error("unexpected output from {tool}: {output:?}")]
    InvalidOutput {
        /// Tool that produced the output
        tool: &'static str,
        /// Offending output
        output: String,
    },

    /// A switch hook exited non-zero
    #[error("{stage} hook failed with status {status}")]
    HookFailed {
        /// Hook that failed
        stage: HookStage,
        /// Exit status
        status: i32,
    },
}

impl ToolchainError {
    /// Errors that retrying the same call cannot fix
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, ToolchainError::Exec(e) if !e.is_retryable())
    }
}
