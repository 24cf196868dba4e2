//! Command executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CommandResult, CommandSpec};

/// Runs processes on behalf of the toolchain
///
/// A non-zero exit status is not an error at this level; callers inspect
/// [`CommandResult::success`].
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, ExecError>;

    /// Run a command, killing it if it exceeds `timeout`
    async fn run_with_timeout(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Short name for logging
    fn executor_type(&self) -> &'static str;
}
