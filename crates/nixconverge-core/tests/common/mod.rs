#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use nixconverge_core::{Environment, ResourceInput};
use nixconverge_nix::{RebuildConfig, SshTarget, SystemImage, Toolchain, ToolchainError};

/// Toolchain call, in the order it was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Probe,
    CollectGarbage,
    Build,
    Activate,
    Query,
}

/// Deterministic toolchain that records calls and fails on request
pub struct FakeToolchain {
    calls: Mutex<Vec<Call>>,
    fail: Mutex<Vec<Call>>,
    built: Mutex<String>,
    active: Mutex<String>,
    activated_with: Mutex<Vec<RebuildConfig>>,
}

impl FakeToolchain {
    pub fn new(image: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: Mutex::new(Vec::new()),
            built: Mutex::new(image.to_string()),
            active: Mutex::new(String::new()),
            activated_with: Mutex::new(Vec::new()),
        }
    }

    /// Make every future `call` fail
    pub fn failing(self, call: Call) -> Self {
        self.fail.lock().unwrap().push(call);
        self
    }

    /// Already-active system on the target
    pub fn with_active(self, image: &str) -> Self {
        *self.active.lock().unwrap() = image.to_string();
        self
    }

    pub fn set_built(&self, image: &str) {
        *self.built.lock().unwrap() = image.to_string();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    /// Forget recorded calls and activations
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
        self.activated_with.lock().unwrap().clear();
    }

    pub fn activated_with(&self) -> Vec<RebuildConfig> {
        self.activated_with.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<(), ToolchainError> {
        self.calls.lock().unwrap().push(call);
        if self.fail.lock().unwrap().contains(&call) {
            return Err(match call {
                Call::Probe => ToolchainError::Unreachable {
                    user: "root".to_string(),
                    host: "web".to_string(),
                    timeout: Duration::from_secs(1),
                },
                _ => ToolchainError::CommandFailed {
                    command: format!("{call:?}"),
                    status: 1,
                    stderr: "simulated failure".to_string(),
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn probe(&self, _target: &SshTarget, _timeout: Duration) -> Result<(), ToolchainError> {
        self.record(Call::Probe)
    }

    async fn collect_garbage(&self, _target: &SshTarget) -> Result<(), ToolchainError> {
        self.record(Call::CollectGarbage)
    }

    async fn build_image(&self, _cfg: &RebuildConfig) -> Result<SystemImage, ToolchainError> {
        self.record(Call::Build)?;
        Ok(SystemImage::new(self.built.lock().unwrap().clone()))
    }

    async fn activate_image(&self, cfg: &RebuildConfig) -> Result<(), ToolchainError> {
        self.record(Call::Activate)?;
        self.activated_with.lock().unwrap().push(cfg.clone());
        let built = self.built.lock().unwrap().clone();
        *self.active.lock().unwrap() = built;
        Ok(())
    }

    async fn query_active_image(
        &self,
        _cfg: &RebuildConfig,
    ) -> Result<SystemImage, ToolchainError> {
        self.record(Call::Query)?;
        Ok(SystemImage::new(self.active.lock().unwrap().clone()))
    }

    fn toolchain_type(&self) -> &'static str {
        "fake"
    }
}

pub fn env() -> Environment {
    Environment {
        nix_path: None,
        ssh_opts: None,
        working_dir: Some(PathBuf::from("/srv/fleet")),
    }
}

pub fn input() -> ResourceInput {
    ResourceInput {
        target_host: Some("10.0.0.7".to_string()),
        nixos_config: Some("hosts/web.nix".to_string()),
        ..ResourceInput::default()
    }
}
