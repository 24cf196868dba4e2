//! Ordered apply sequence

use std::fmt;

use nixconverge_nix::Toolchain;
use tracing::{info, instrument};

use crate::config::{DeploymentConfig, Environment};
use crate::context::{ApplyView, ChangeSource};
use crate::error::CoreError;
use crate::field::Field;
use crate::reader::StateReader;
use crate::record::new_identity;

/// One remote step of an apply, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Probe,
    CollectGarbage,
    Activate,
    Refresh,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Probe => write!(f, "probe"),
            Step::CollectGarbage => write!(f, "collect-garbage"),
            Step::Activate => write!(f, "activate"),
            Step::Refresh => write!(f, "refresh"),
        }
    }
}

/// Steps an apply performs
#[must_use]
pub fn steps(collect_garbage: bool, activate: bool) -> Vec<Step> {
    let mut steps = vec![Step::Probe];
    if collect_garbage {
        steps.push(Step::CollectGarbage);
    }
    if activate {
        steps.push(Step::Activate);
    }
    steps.push(Step::Refresh);
    steps
}

/// Activation is needed iff a tracked field changed
#[must_use]
pub fn needs_activation(view: &dyn ChangeSource) -> bool {
    Field::TRACKED.into_iter().any(|f| view.has_change(f))
}

/// Converges a target: identity, resolve, probe, cleanup, activate, refresh
///
/// Each step is fatal on failure and later steps are not attempted. Nothing
/// is rolled back.
pub struct Converger<'a> {
    toolchain: &'a dyn Toolchain,
    env: &'a Environment,
}

impl<'a> Converger<'a> {
    #[must_use]
    pub fn new(toolchain: &'a dyn Toolchain, env: &'a Environment) -> Self {
        Self { toolchain, env }
    }

    /// Run the apply sequence, updating `view` with identity and state
    ///
    /// # Errors
    /// Returns the `CoreError` of the first failing step.
    #[instrument(skip_all)]
    pub async fn converge(&self, view: &mut ApplyView) -> Result<(), CoreError> {
        if view.id().is_none() {
            let id = new_identity();
            info!(id = %id, "assigned deployment identity");
            view.assign_id(id);
        }

        let cfg = DeploymentConfig::resolve(view, self.env)?;
        let activate = needs_activation(view);
        if !activate {
            info!(host = %cfg.target_host, "no tracked field changed, skipping activation");
        }

        for step in steps(cfg.collect_garbage, activate) {
            info!(host = %cfg.target_host, step = %step, "apply step");
            self.run_step(step, &cfg, view).await?;
        }
        Ok(())
    }

    async fn run_step(
        &self,
        step: Step,
        cfg: &DeploymentConfig,
        view: &mut ApplyView,
    ) -> Result<(), CoreError> {
        match step {
            Step::Probe => self
                .toolchain
                .probe(&cfg.ssh_target(), cfg.ssh_timeout)
                .await
                .map_err(CoreError::Unreachable),
            Step::CollectGarbage => self
                .toolchain
                .collect_garbage(&cfg.ssh_target())
                .await
                .map_err(CoreError::Cleanup),
            Step::Activate => {
                let rebuild = cfg.rebuild_config();
                let image = self
                    .toolchain
                    .build_image(&rebuild)
                    .await
                    .map_err(CoreError::Build)?;
                info!(host = %cfg.target_host, system = %image, "activating system");
                self.toolchain
                    .activate_image(&rebuild)
                    .await
                    .map_err(CoreError::Activation)
            }
            Step::Refresh => {
                let state = StateReader::new(self.toolchain, self.env).read(view).await?;
                view.set_remote_state(&state);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_order() {
        assert_eq!(
            steps(true, true),
            vec![Step::Probe, Step::CollectGarbage, Step::Activate, Step::Refresh]
        );
        assert_eq!(steps(false, true), vec![Step::Probe, Step::Activate, Step::Refresh]);
        assert_eq!(steps(true, false), vec![Step::Probe, Step::CollectGarbage, Step::Refresh]);
        assert_eq!(steps(false, false), vec![Step::Probe, Step::Refresh]);
    }
}
