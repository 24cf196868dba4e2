//! Plan-time diff of the desired system against the record

use kameo_macros::Reply;
use nixconverge_nix::{SystemImage, Toolchain};
use tracing::{info, instrument, warn};

use crate::config::{DeploymentConfig, Environment};
use crate::context::{FieldSource, PlanView};
use crate::error::CoreError;
use crate::field::Field;

/// Result of planning one deployment
#[derive(Debug, Clone, Default, PartialEq, Reply)]
pub struct PlanOutcome {
    /// Freshly built system, if the build succeeded
    pub desired_image: Option<SystemImage>,
    /// `nixos_system` will be recomputed by apply
    pub system_pending: bool,
    /// Configuration fields that differ from the record
    pub changed_fields: Vec<Field>,
}

impl PlanOutcome {
    /// Whether apply would do anything
    #[must_use]
    pub fn needs_apply(&self) -> bool {
        self.system_pending || !self.changed_fields.is_empty()
    }
}

/// Builds the desired system without activating it and compares it to the
/// recorded one
pub struct PlanDiffer<'a> {
    toolchain: &'a dyn Toolchain,
    env: &'a Environment,
}

impl<'a> PlanDiffer<'a> {
    #[must_use]
    pub fn new(toolchain: &'a dyn Toolchain, env: &'a Environment) -> Self {
        Self { toolchain, env }
    }

    /// Compute the plan
    ///
    /// A build failure is not an error here: configurations that depend on
    /// values generated during apply cannot evaluate yet. The state is marked
    /// pending and apply surfaces the failure if it persists.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the configuration cannot be resolved.
    #[instrument(skip_all)]
    pub async fn diff(&self, view: &PlanView<'_>) -> Result<PlanOutcome, CoreError> {
        let cfg = DeploymentConfig::resolve(view, self.env)?;
        let changed_fields = view.changed_fields();

        let desired = match self.toolchain.build_image(&cfg.rebuild_config()).await {
            Ok(image) => image,
            Err(e) => {
                warn!(
                    host = %cfg.target_host,
                    error = %e,
                    "build failed, assuming generated configuration; deferring to apply"
                );
                return Ok(PlanOutcome {
                    desired_image: None,
                    system_pending: true,
                    changed_fields,
                });
            }
        };

        let recorded = view.value(Field::NixosSystem);
        let system_pending = recorded.as_ref().and_then(|v| v.as_str()) != Some(desired.as_str());

        info!(
            host = %cfg.target_host,
            desired = %desired,
            pending = system_pending,
            "planned system"
        );

        Ok(PlanOutcome {
            desired_image: Some(desired),
            system_pending,
            changed_fields,
        })
    }
}
