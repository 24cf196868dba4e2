//! nixconverge-nix: Toolchain abstraction
//!
//! Provides the trait the convergence engine drives (probe, garbage
//! collection, build, activation, active-image query) and its
//! implementation on top of the Nix command line tools

pub mod error;
pub mod nixos;
pub mod probe;
pub mod traits;
pub mod types;

pub use error::{HookStage, ToolchainError};
pub use nixos::NixToolchain;
pub use probe::{Backoff, ReachabilityProbe};
pub use traits::Toolchain;
pub use types::{RebuildConfig, SshTarget, SystemImage};
