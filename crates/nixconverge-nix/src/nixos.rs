//! NixOS toolchain driving ssh, nix-build and nixos-rebuild

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nixconverge_exec::{CommandExecutor, CommandResult, CommandSpec};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument};

use crate::error::{HookStage, ToolchainError};
use crate::probe::ReachabilityProbe;
use crate::traits::Toolchain;
use crate::types::{RebuildConfig, SshTarget, SystemImage};

/// Longest `ConnectTimeout` handed to a single ssh attempt
const MAX_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Symlink to the running system on NixOS hosts
const CURRENT_SYSTEM: &str = "/run/current-system";

/// Toolchain implementation for NixOS targets
pub struct NixToolchain {
    /// Executor for spawning the tools
    executor: Arc<dyn CommandExecutor>,
    /// Retry policy for `probe`
    probe: ReachabilityProbe,
}

impl NixToolchain {
    /// Create a toolchain with the default probe backoff
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::with_probe(executor, ReachabilityProbe::default())
    }

    /// Create a toolchain with a custom probe policy
    pub fn with_probe(executor: Arc<dyn CommandExecutor>, probe: ReachabilityProbe) -> Self {
        debug!(executor = executor.executor_type(), "nixos toolchain ready");
        Self { executor, probe }
    }

    /// `ssh <opts> user@host <remote...>`
    fn ssh_cmd(target: &SshTarget, remote: &[&str]) -> CommandSpec {
        CommandSpec::new("ssh")
            .args(target.opts_args())
            .arg(target.destination())
            .args(remote.iter().copied())
    }

    /// `nix-build` of the system attribute, delegated to the build host if any
    fn build_cmd(cfg: &RebuildConfig) -> CommandSpec {
        let mut spec = CommandSpec::new("nix-build")
            .args(["<nixpkgs/nixos>", "-A", "system", "--no-out-link", "-I"])
            .arg(cfg.nixos_config_include());

        if !cfg.builds_locally() {
            spec = spec
                .args(["--option", "builders"])
                .arg(format!("ssh://{}", cfg.build_host))
                .args(["--max-jobs", "0"]);
        }

        with_nix_env(spec, cfg)
    }

    /// `nixos-rebuild switch` against the target
    fn switch_cmd(cfg: &RebuildConfig) -> CommandSpec {
        let mut spec = CommandSpec::new("nixos-rebuild")
            .args(["switch", "--target-host"])
            .arg(cfg.target().destination())
            .arg("-I")
            .arg(cfg.nixos_config_include());

        if !cfg.builds_locally() {
            spec = spec.arg("--build-host").arg(&cfg.build_host);
        }
        if cfg.target_user != "root" {
            spec = spec.arg("--use-remote-sudo");
        }

        with_nix_env(spec, cfg).env("NIX_SSHOPTS", &cfg.ssh_opts)
    }

    /// Run a hook through the shell with the target in its environment
    async fn run_hook(
        &self,
        stage: HookStage,
        hook: Option<&SecretString>,
        cfg: &RebuildConfig,
    ) -> Result<(), ToolchainError> {
        let Some(hook) = hook else {
            return Ok(());
        };

        info!(host = %cfg.target_host, stage = %stage, "running switch hook");

        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg(hook.expose_secret())
            .env("TARGET_HOST", &cfg.target_host)
            .env("TARGET_USER", &cfg.target_user)
            .redacted();

        let result = self.executor.run(&spec).await?;
        if !result.success() {
            return Err(ToolchainError::HookFailed {
                stage,
                status: result.status,
            });
        }
        Ok(())
    }

    /// Run a command and require a zero exit status
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandResult, ToolchainError> {
        let result = self.executor.run(spec).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(failed(spec, &result))
        }
    }
}

fn with_nix_env(spec: CommandSpec, cfg: &RebuildConfig) -> CommandSpec {
    if cfg.nix_path.is_empty() {
        spec
    } else {
        spec.env("NIX_PATH", &cfg.nix_path)
    }
}

fn failed(spec: &CommandSpec, result: &CommandResult) -> ToolchainError {
    ToolchainError::CommandFailed {
        command: spec.to_string(),
        status: result.status,
        stderr: result.stderr.trim().to_string(),
    }
}

/// `ConnectTimeout` for one attempt, at least a second
fn connect_timeout_secs(remaining: Duration) -> u64 {
    remaining.as_secs().clamp(1, MAX_CONNECT_TIMEOUT_SECS)
}

#[async_trait]
impl Toolchain for NixToolchain {
    #[instrument(skip(self), fields(host = %target.host))]
    async fn probe(&self, target: &SshTarget, timeout: Duration) -> Result<(), ToolchainError> {
        self.probe
            .wait(target, timeout, |remaining| async move {
                let spec = CommandSpec::new("ssh")
                    .args(target.opts_args())
                    .arg("-o")
                    .arg(format!("ConnectTimeout={}", connect_timeout_secs(remaining)))
                    .arg(target.destination())
                    .arg("true");
                let result = self.executor.run_with_timeout(&spec, remaining).await?;
                if result.success() {
                    Ok(())
                } else {
                    Err(failed(&spec, &result))
                }
            })
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), fields(host = %target.host))]
    async fn collect_garbage(&self, target: &SshTarget) -> Result<(), ToolchainError> {
        info!(host = %target.host, "collecting garbage");

        let result = self
            .run_checked(&Self::ssh_cmd(target, &["nix-collect-garbage"]))
            .await?;

        debug!(host = %target.host, output = ?result.last_line(), "garbage collected");
        Ok(())
    }

    #[instrument(skip(self, cfg), fields(host = %cfg.target_host, build_host = %cfg.build_host))]
    async fn build_image(&self, cfg: &RebuildConfig) -> Result<SystemImage, ToolchainError> {
        info!(config = %cfg.nixos_config.display(), "building system");

        let result = self.run_checked(&Self::build_cmd(cfg)).await?;
        let line = result.last_line().unwrap_or_default();

        SystemImage::parse_store_path(line).ok_or_else(|| ToolchainError::InvalidOutput {
            tool: "nix-build",
            output: line.to_string(),
        })
    }

    #[instrument(skip(self, cfg), fields(host = %cfg.target_host))]
    async fn activate_image(&self, cfg: &RebuildConfig) -> Result<(), ToolchainError> {
        self.run_hook(HookStage::PreSwitch, cfg.pre_switch_hook.as_ref(), cfg)
            .await?;

        info!(host = %cfg.target_host, "switching system");
        self.run_checked(&Self::switch_cmd(cfg)).await?;

        self.run_hook(HookStage::PostSwitch, cfg.post_switch_hook.as_ref(), cfg)
            .await
    }

    #[instrument(skip(self, cfg), fields(host = %cfg.target_host))]
    async fn query_active_image(
        &self,
        cfg: &RebuildConfig,
    ) -> Result<SystemImage, ToolchainError> {
        let spec = Self::ssh_cmd(&cfg.target(), &["readlink", "-f", CURRENT_SYSTEM]);
        let result = self.run_checked(&spec).await?;
        let line = result.first_line().unwrap_or_default();

        SystemImage::parse_store_path(line).ok_or_else(|| ToolchainError::InvalidOutput {
            tool: "readlink",
            output: line.to_string(),
        })
    }

    fn toolchain_type(&self) -> &'static str {
        "nixos"
    }
}
