//! Type definitions shared by the toolchain and the engine

use std::fmt;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Identifier of a built system closure, normally a `/nix/store` path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemImage(String);

impl SystemImage {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a store path printed by a Nix tool
    #[must_use]
    pub fn parse_store_path(line: &str) -> Option<Self> {
        let line = line.trim();
        let name = line.strip_prefix("/nix/store/")?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }
        Some(Self(line.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SystemImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where and how to open an ssh session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub user: String,
    pub host: String,
    /// Extra ssh options, whitespace separated
    pub opts: String,
}

impl SshTarget {
    pub fn new(user: impl Into<String>, host: impl Into<String>, opts: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            opts: opts.into(),
        }
    }

    /// `user@host`
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Session options split into ssh arguments
    pub fn opts_args(&self) -> impl Iterator<Item = &str> {
        self.opts.split_whitespace()
    }
}

/// Everything the build and activation tools need, and nothing else
#[derive(Debug, Clone)]
pub struct RebuildConfig {
    pub target_host: String,
    pub target_user: String,
    pub build_host: String,
    /// Absolute path to the NixOS configuration
    pub nixos_config: PathBuf,
    /// Search path handed to Nix as `NIX_PATH`, empty for the ambient one
    pub nix_path: String,
    pub ssh_opts: String,
    pub pre_switch_hook: Option<SecretString>,
    pub post_switch_hook: Option<SecretString>,
}

impl RebuildConfig {
    /// ssh target for the host being converged
    #[must_use]
    pub fn target(&self) -> SshTarget {
        SshTarget::new(&self.target_user, &self.target_host, &self.ssh_opts)
    }

    /// Whether builds run on this machine
    #[must_use]
    pub fn builds_locally(&self) -> bool {
        self.build_host == "localhost"
    }

    /// `nixos-config=<path>` include argument
    #[must_use]
    pub fn nixos_config_include(&self) -> String {
        format!("nixos-config={}", self.nixos_config.display())
    }
}
