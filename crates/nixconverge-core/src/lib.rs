//! nixconverge-core: Convergence engine
//!
//! Resolves deployment configuration, computes plan-time diffs, converges
//! the target in a fixed order and reads back the active system. Each
//! deployment is driven through a `DeploymentActor` so invocations for one
//! resource never overlap.

pub mod actor;
pub mod config;
pub mod context;
pub mod converger;
pub mod differ;
pub mod error;
pub mod field;
pub mod lifecycle;
pub mod message;
pub mod reader;
pub mod record;

pub use actor::{DeploymentActor, DeploymentActorArgs};
pub use config::{DEFAULT_SSH_OPTS, DeploymentConfig, Environment};
pub use context::{ApplyView, ChangeSource, FieldSource, PlanView, RecordView};
pub use converger::{Converger, Step};
pub use differ::{PlanDiffer, PlanOutcome};
pub use error::CoreError;
pub use field::{Field, ResourceInput, Value};
pub use lifecycle::{Engine, Phase, PhaseOutput};
pub use message::{ApplyDeployment, ApplyReport, DestroyDeployment, GetRecord, PlanDeployment, RefreshDeployment};
pub use reader::StateReader;
pub use record::{RemoteState, ResourceRecord};
