//! nixconverge-exec: Process execution abstraction
//!
//! Provides the executor trait and a local implementation used to drive
//! `ssh`, `nix-build` and `nixos-rebuild`

pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::{CommandResult, CommandSpec};
pub use traits::CommandExecutor;
