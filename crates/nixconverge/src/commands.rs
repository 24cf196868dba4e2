//! Subcommand implementations

use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr;
use kameo::actor::{ActorRef, Spawn};
use kameo::error::SendError;
use nixconverge_core::{
    ApplyDeployment, CoreError, DeploymentActor, DeploymentActorArgs, DestroyDeployment, Engine,
    PlanDeployment, PlanOutcome, RefreshDeployment, ResourceRecord,
};
use tracing::{info, warn};

use crate::config::Loaded;
use crate::state::StateFile;

/// Flatten an actor reply into the engine's error type
fn reply<M, T>(result: Result<T, SendError<M, CoreError>>) -> Result<T, CoreError> {
    result.map_err(|e| match e {
        SendError::HandlerError(err) => err,
        other => CoreError::ActorError(other.to_string()),
    })
}

fn spawn(engine: &Arc<Engine>, name: &str, record: ResourceRecord) -> ActorRef<DeploymentActor> {
    DeploymentActor::spawn(DeploymentActorArgs {
        name: name.to_string(),
        engine: engine.clone(),
        record,
    })
}

/// Requested deployment names, or all of `available`
fn select<'a>(
    requested: &'a [String],
    available: impl Iterator<Item = &'a String>,
) -> Vec<&'a String> {
    if requested.is_empty() {
        available.collect()
    } else {
        requested.iter().collect()
    }
}

fn describe(plan: &PlanOutcome, created: bool) -> String {
    if !created {
        return "create".to_string();
    }
    if !plan.needs_apply() {
        return "no changes".to_string();
    }

    let mut reasons = Vec::new();
    if plan.system_pending {
        reasons.push(match &plan.desired_image {
            Some(image) => format!("nixos_system -> {image}"),
            None => "nixos_system (known after apply)".to_string(),
        });
    }
    if !plan.changed_fields.is_empty() {
        let names: Vec<&str> = plan.changed_fields.iter().map(|f| f.name()).collect();
        reasons.push(format!("changed: {}", names.join(", ")));
    }
    format!("update ({})", reasons.join("; "))
}

fn unknown(loaded: &Loaded, name: &str) -> eyre::Report {
    eyre::eyre!("deployment `{name}` is not defined in {}", loaded.path.display())
}

/// Show what apply would do
pub async fn plan(
    engine: &Arc<Engine>,
    loaded: &Loaded,
    state: &StateFile,
    names: &[String],
) -> eyre::Result<()> {
    for name in select(names, loaded.file.deployment.keys()) {
        let input = loaded
            .file
            .deployment
            .get(name)
            .ok_or_else(|| unknown(loaded, name))?;
        let record = state.record(name);
        let created = record.is_created();

        let actor_ref = spawn(engine, name, record);
        let outcome = reply(
            actor_ref
                .ask(PlanDeployment {
                    input: input.clone(),
                })
                .await,
        )
        .wrap_err_with(|| format!("planning `{name}`"))?;
        actor_ref.stop_gracefully().await.ok();

        println!("{name}: {}", describe(&outcome, created));
    }

    for name in state.deployments.keys() {
        if !loaded.file.deployment.contains_key(name) {
            println!("{name}: not in deployment file (run `destroy {name}` to release)");
        }
    }
    Ok(())
}

/// Converge deployments, persisting each record as it succeeds
pub async fn apply(
    engine: &Arc<Engine>,
    loaded: &Loaded,
    state: &mut StateFile,
    state_path: &Path,
    names: &[String],
) -> eyre::Result<()> {
    for name in select(names, loaded.file.deployment.keys()) {
        let input = loaded
            .file
            .deployment
            .get(name)
            .ok_or_else(|| unknown(loaded, name))?;

        let actor_ref = spawn(engine, name, state.record(name));
        let result = reply(
            actor_ref
                .ask(ApplyDeployment {
                    input: input.clone(),
                })
                .await,
        );
        actor_ref.stop_gracefully().await.ok();

        let report = result.wrap_err_with(|| format!("applying `{name}`"))?;
        let system = report
            .record
            .remote_state()
            .map_or_else(|| "-".to_string(), |s| s.to_string());

        if report.applied {
            state.put(name, report.record);
            state.save(state_path)?;
            println!("{name}: applied, nixos_system = {system}");
        } else {
            println!("{name}: no changes, nixos_system = {system}");
        }
    }
    Ok(())
}

/// Re-read the active system of created deployments
pub async fn refresh(
    engine: &Arc<Engine>,
    state: &mut StateFile,
    state_path: &Path,
    names: &[String],
) -> eyre::Result<()> {
    let known: Vec<String> = state.deployments.keys().cloned().collect();

    for name in select(names, known.iter()) {
        let record = state.record(name);
        if !record.is_created() {
            warn!(deployment = %name, "no record, skipping refresh");
            continue;
        }

        let actor_ref = spawn(engine, name, record);
        let result = reply(actor_ref.ask(RefreshDeployment).await);
        actor_ref.stop_gracefully().await.ok();

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                state.save(state_path)?;
                return Err(e).wrap_err_with(|| format!("refreshing `{name}`"));
            }
        };
        let system = record
            .remote_state()
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        state.put(name, record);
        println!("{name}: nixos_system = {system}");
    }

    state.save(state_path)
}

/// Forget deployment records; targets are left as they are
pub async fn destroy(
    engine: &Arc<Engine>,
    state: &mut StateFile,
    state_path: &Path,
    names: &[String],
) -> eyre::Result<()> {
    let known: Vec<String> = state.deployments.keys().cloned().collect();

    for name in select(names, known.iter()) {
        let actor_ref = spawn(engine, name, state.record(name));
        let result = reply(actor_ref.ask(DestroyDeployment).await);
        actor_ref.stop_gracefully().await.ok();

        if let Err(e) = result {
            state.save(state_path)?;
            return Err(e).wrap_err_with(|| format!("destroying `{name}`"));
        }
        state.put(name, ResourceRecord::default());
        info!(deployment = %name, "record released");
        println!("{name}: released");
    }

    state.save(state_path)
}
