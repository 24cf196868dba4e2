//! Message types for actor communication
//!
//! Message handlers are implemented in `actor::deployment`.

use kameo_macros::Reply;

use crate::differ::PlanOutcome;
use crate::field::ResourceInput;
use crate::record::ResourceRecord;

/// Plan the deployment against its record
#[derive(Debug)]
pub struct PlanDeployment {
    pub input: ResourceInput,
}

/// Converge the target if the plan shows changes
#[derive(Debug)]
pub struct ApplyDeployment {
    pub input: ResourceInput,
}

/// Apply outcome
#[derive(Debug, Clone, Reply)]
pub struct ApplyReport {
    /// Plan that drove the apply
    pub plan: PlanOutcome,
    /// Record after the apply
    pub record: ResourceRecord,
    /// Whether the converge sequence ran
    pub applied: bool,
}

/// Re-read `nixos_system` from the target
#[derive(Debug)]
pub struct RefreshDeployment;

/// Drop the record without touching the target
#[derive(Debug)]
pub struct DestroyDeployment;

/// Get the current record
#[derive(Debug)]
pub struct GetRecord;
