//! Lifecycle phases and the engine that dispatches them

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use nixconverge_nix::Toolchain;
use tracing::{debug, info};

use crate::config::Environment;
use crate::context::{ApplyView, PlanView, RecordView};
use crate::converger::Converger;
use crate::differ::{PlanDiffer, PlanOutcome};
use crate::error::CoreError;
use crate::field::ResourceInput;
use crate::reader::StateReader;
use crate::record::ResourceRecord;

/// Lifecycle phase requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Plan,
    Apply,
    Read,
    Destroy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Plan => write!(f, "plan"),
            Phase::Apply => write!(f, "apply"),
            Phase::Read => write!(f, "read"),
            Phase::Destroy => write!(f, "destroy"),
        }
    }
}

/// What a phase leaves behind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseOutput {
    /// Record to persist; `None` removes it
    pub record: Option<ResourceRecord>,
    /// Plan computed during this phase, if any
    pub plan: Option<PlanOutcome>,
}

/// Convergence engine bound to one toolchain and environment snapshot
pub struct Engine {
    toolchain: Arc<dyn Toolchain>,
    env: Environment,
}

impl Engine {
    pub fn new(toolchain: Arc<dyn Toolchain>, env: Environment) -> Self {
        debug!(toolchain = toolchain.toolchain_type(), "engine ready");
        Self { toolchain, env }
    }

    /// Plan phase: never mutates the target
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the configuration cannot be resolved.
    pub async fn plan(
        &self,
        prior: &ResourceRecord,
        input: &ResourceInput,
    ) -> Result<PlanOutcome, CoreError> {
        PlanDiffer::new(self.toolchain.as_ref(), &self.env)
            .diff(&PlanView::new(input, prior))
            .await
    }

    /// Create/update phase: returns the record to persist
    ///
    /// # Errors
    /// Returns the first failing step's error; the prior record stays valid.
    pub async fn apply(
        &self,
        prior: &ResourceRecord,
        input: &ResourceInput,
        plan: &PlanOutcome,
    ) -> Result<ResourceRecord, CoreError> {
        let mut view = ApplyView::new(input.clone(), prior.clone(), plan.system_pending);
        Converger::new(self.toolchain.as_ref(), &self.env)
            .converge(&mut view)
            .await?;

        let mut record = view.into_record();
        record.updated_at = Some(Utc::now());
        Ok(record)
    }

    /// Read phase: refresh `nixos_system` from the target
    ///
    /// # Errors
    /// Returns `CoreError::NotCreated` for a record without identity, or the
    /// reader's error.
    pub async fn read(&self, record: &ResourceRecord) -> Result<ResourceRecord, CoreError> {
        if !record.is_created() {
            return Err(CoreError::NotCreated);
        }

        let state = StateReader::new(self.toolchain.as_ref(), &self.env)
            .read(&RecordView::new(record))
            .await?;

        let mut refreshed = record.clone();
        refreshed.set_remote_state(&state);
        Ok(refreshed)
    }

    /// Destroy phase: forget the record, leave the target untouched
    pub fn destroy(&self, record: &ResourceRecord) {
        info!(
            id = record.id.as_deref().unwrap_or("-"),
            "releasing deployment record; target left as is"
        );
    }

    /// Run a phase against the persisted record
    ///
    /// Apply plans first and does nothing for an existing deployment whose
    /// plan shows no change.
    ///
    /// # Errors
    /// Returns the phase's error.
    pub async fn run(
        &self,
        phase: Phase,
        prior: Option<&ResourceRecord>,
        input: &ResourceInput,
    ) -> Result<PhaseOutput, CoreError> {
        let empty = ResourceRecord::default();
        let prior_record = prior.unwrap_or(&empty);

        match phase {
            Phase::Plan => {
                let plan = self.plan(prior_record, input).await?;
                Ok(PhaseOutput {
                    record: prior.cloned(),
                    plan: Some(plan),
                })
            }
            Phase::Apply => {
                let plan = self.plan(prior_record, input).await?;
                if prior_record.is_created() && !plan.needs_apply() {
                    info!("no changes planned");
                    return Ok(PhaseOutput {
                        record: prior.cloned(),
                        plan: Some(plan),
                    });
                }
                let record = self.apply(prior_record, input, &plan).await?;
                Ok(PhaseOutput {
                    record: Some(record),
                    plan: Some(plan),
                })
            }
            Phase::Read => {
                let record = self.read(prior.ok_or(CoreError::NotCreated)?).await?;
                Ok(PhaseOutput {
                    record: Some(record),
                    plan: None,
                })
            }
            Phase::Destroy => {
                if let Some(record) = prior {
                    self.destroy(record);
                }
                Ok(PhaseOutput::default())
            }
        }
    }
}
