//! `DeploymentActor`: one deployment, one mailbox
//!
//! Handles plan, apply, refresh and destroy for a single deployment. The
//! mailbox processes one message at a time, so two phases for the same
//! deployment never interleave within a process.

use std::sync::Arc;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{error, info};

use crate::differ::PlanOutcome;
use crate::error::CoreError;
use crate::lifecycle::{Engine, Phase};
use crate::message::{
    ApplyDeployment, ApplyReport, DestroyDeployment, GetRecord, PlanDeployment,
    RefreshDeployment,
};
use crate::record::ResourceRecord;

/// Arguments for spawning a `DeploymentActor`
pub struct DeploymentActorArgs {
    /// Deployment name, for logging
    pub name: String,
    /// Shared engine
    pub engine: Arc<Engine>,
    /// Persisted record, empty for a new deployment
    pub record: ResourceRecord,
}

/// Per-deployment actor owning the record between phases
pub struct DeploymentActor {
    name: String,
    engine: Arc<Engine>,
    record: ResourceRecord,
}

impl DeploymentActor {
    fn prior(&self) -> Option<&ResourceRecord> {
        self.record.is_created().then_some(&self.record)
    }

    fn log_failure(&self, phase: Phase, e: &CoreError) {
        error!(deployment = %self.name, phase = %phase, error = %e, "phase failed");
    }
}

impl Actor for DeploymentActor {
    type Args = DeploymentActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            deployment = %args.name,
            id = %actor_ref.id(),
            created = args.record.is_created(),
            "DeploymentActor starting"
        );

        Ok(Self {
            name: args.name,
            engine: args.engine,
            record: args.record,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(deployment = %self.name, reason = ?reason, "DeploymentActor stopping");
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<PlanDeployment> for DeploymentActor {
    type Reply = Result<PlanOutcome, CoreError>;

    async fn handle(
        &mut self,
        msg: PlanDeployment,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let output = self
            .engine
            .run(Phase::Plan, self.prior(), &msg.input)
            .await
            .inspect_err(|e| self.log_failure(Phase::Plan, e))?;

        output
            .plan
            .ok_or_else(|| CoreError::ActorError("plan phase produced no plan".to_string()))
    }
}

impl Message<ApplyDeployment> for DeploymentActor {
    type Reply = Result<ApplyReport, CoreError>;

    async fn handle(
        &mut self,
        msg: ApplyDeployment,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let output = self
            .engine
            .run(Phase::Apply, self.prior(), &msg.input)
            .await
            .inspect_err(|e| self.log_failure(Phase::Apply, e))?;

        let record = output.record.unwrap_or_default();
        let applied = record != self.record;
        self.record = record.clone();

        info!(
            deployment = %self.name,
            applied,
            system = ?self.record.remote_state().map(|s| s.to_string()),
            "apply finished"
        );

        Ok(ApplyReport {
            plan: output.plan.unwrap_or_default(),
            record,
            applied,
        })
    }
}

impl Message<RefreshDeployment> for DeploymentActor {
    type Reply = Result<ResourceRecord, CoreError>;

    async fn handle(
        &mut self,
        _msg: RefreshDeployment,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let output = self
            .engine
            .run(Phase::Read, self.prior(), &Default::default())
            .await
            .inspect_err(|e| self.log_failure(Phase::Read, e))?;

        self.record = output.record.unwrap_or_default();
        Ok(self.record.clone())
    }
}

impl Message<DestroyDeployment> for DeploymentActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        _msg: DestroyDeployment,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.engine
            .run(Phase::Destroy, self.prior(), &Default::default())
            .await?;

        self.record = ResourceRecord::default();
        info!(deployment = %self.name, "deployment record released");
        Ok(())
    }
}

impl Message<GetRecord> for DeploymentActor {
    type Reply = ResourceRecord;

    async fn handle(
        &mut self,
        _msg: GetRecord,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.record.clone()
    }
}
