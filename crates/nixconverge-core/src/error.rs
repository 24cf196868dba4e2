//! Core error types for nixconverge-core

use nixconverge_nix::ToolchainError;
use thiserror::Error;

/// Errors surfaced by a lifecycle phase
///
/// Plan-time build failures never reach this type; they become a pending
/// `nixos_system` instead.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// A field could not be resolved
    #[error("configuration error: {0}")]
    Config(String),

    /// The target could not be reached within `ssh_timeout`
    #[error("target unreachable: {0}")]
    Unreachable(ToolchainError),

    /// The system closure could not be built
    #[error("build failed: {0}")]
    Build(ToolchainError),

    /// Garbage collection on the target failed
    #[error("garbage collection failed: {0}")]
    Cleanup(ToolchainError),

    /// Switching the target failed, possibly half way
    #[error("activation failed: {0}")]
    Activation(ToolchainError),

    /// The active system could not be determined on a reachable target
    #[error("querying active system failed: {0}")]
    Query(ToolchainError),

    /// Read or refresh on a resource without identity
    #[error("deployment has not been created")]
    NotCreated,

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}
