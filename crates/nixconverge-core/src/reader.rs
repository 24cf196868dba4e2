//! Reads the active system back from the target

use nixconverge_nix::Toolchain;
use tracing::{info, warn};

use crate::config::{DeploymentConfig, Environment};
use crate::context::FieldSource;
use crate::error::CoreError;
use crate::record::RemoteState;

/// Derives `nixos_system` from the target
pub struct StateReader<'a> {
    toolchain: &'a dyn Toolchain,
    env: &'a Environment,
}

impl<'a> StateReader<'a> {
    #[must_use]
    pub fn new(toolchain: &'a dyn Toolchain, env: &'a Environment) -> Self {
        Self { toolchain, env }
    }

    /// Probe the target and query its active system
    ///
    /// An unreachable target yields `RemoteState::Unknown` rather than an
    /// error.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the configuration cannot be resolved, or
    /// `CoreError::Query` if a reachable target cannot report its system.
    pub async fn read(&self, source: &dyn FieldSource) -> Result<RemoteState, CoreError> {
        let cfg = DeploymentConfig::resolve(source, self.env)?;

        if let Err(e) = self.toolchain.probe(&cfg.ssh_target(), cfg.ssh_timeout).await {
            warn!(host = %cfg.target_host, error = %e, "target unreachable, system unknown");
            return Ok(RemoteState::Unknown);
        }

        let image = self
            .toolchain
            .query_active_image(&cfg.rebuild_config())
            .await
            .map_err(CoreError::Query)?;

        info!(host = %cfg.target_host, system = %image, "read active system");
        Ok(RemoteState::Active(image))
    }
}
