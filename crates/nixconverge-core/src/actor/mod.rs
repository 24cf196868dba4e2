//! Actor implementations

pub mod deployment;

pub use deployment::{DeploymentActor, DeploymentActorArgs};
