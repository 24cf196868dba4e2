//! Deployment file loading and types

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use nixconverge_core::ResourceInput;
use serde::{Deserialize, Serialize};

/// Environment variable naming the deployment file
pub const CONFIG_ENV: &str = "NIXCONVERGE_CONFIG";

const DEFAULT_FILE: &str = "nixconverge.toml";

/// Top-level deployment file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentFile {
    /// Tool settings
    #[serde(default)]
    pub settings: Settings,
    /// Deployments by name
    #[serde(default)]
    pub deployment: BTreeMap<String, ResourceInput>,
}

/// Tool settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// State file, relative to the deployment file
    pub state_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// A deployment file together with where it was found
#[derive(Debug, Clone)]
pub struct Loaded {
    pub path: PathBuf,
    pub file: DeploymentFile,
}

impl Loaded {
    /// State file path: explicit, from settings, or next to the deployment file
    #[must_use]
    pub fn state_path(&self, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        match &self.file.settings.state_file {
            Some(p) => dir.join(p),
            None => dir.join("nixconverge.state.json"),
        }
    }
}

impl DeploymentFile {
    /// Parse a deployment file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        Self::parse(&content).wrap_err_with(|| format!("parsing {}", path.display()))
    }

    /// Parse deployment file contents
    ///
    /// # Errors
    /// Returns error on invalid TOML or unknown keys
    pub fn parse(content: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Locate and load the deployment file
    ///
    /// Order: `explicit`, `NIXCONVERGE_CONFIG`, `./nixconverge.toml`, then the
    /// user config directory.
    ///
    /// # Errors
    /// Returns error if no file is found or it cannot be loaded
    pub fn discover(explicit: Option<&Path>) -> eyre::Result<Loaded> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => Self::candidates()
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| eyre::eyre!("no deployment file found; pass --file or set {CONFIG_ENV}"))?,
        };

        let file = Self::load(&path)?;
        tracing::debug!(path = %path.display(), deployments = file.deployment.len(), "loaded deployment file");
        Ok(Loaded { path, file })
    }

    fn candidates() -> Vec<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return vec![PathBuf::from(path)];
        }

        let mut paths = vec![PathBuf::from(DEFAULT_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("nixconverge").join(DEFAULT_FILE));
        }
        paths
    }
}
