//! Toolchain trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ToolchainError;
use crate::types::{RebuildConfig, SshTarget, SystemImage};

/// The operations the convergence engine needs from the outside world
///
/// None of these retry except `probe`, which retries within its budget.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Block until an ssh session to `target` succeeds or `timeout` elapses
    async fn probe(&self, target: &SshTarget, timeout: Duration) -> Result<(), ToolchainError>;

    /// Remove unreferenced store paths on the target
    async fn collect_garbage(&self, target: &SshTarget) -> Result<(), ToolchainError>;

    /// Build the system closure without activating it
    async fn build_image(&self, cfg: &RebuildConfig) -> Result<SystemImage, ToolchainError>;

    /// Switch the target to the configuration, running hooks around it
    async fn activate_image(&self, cfg: &RebuildConfig) -> Result<(), ToolchainError>;

    /// Currently active system closure on the target
    async fn query_active_image(&self, cfg: &RebuildConfig)
    -> Result<SystemImage, ToolchainError>;

    fn toolchain_type(&self) -> &'static str;
}
