//! Persisted deployment records

use std::collections::BTreeMap;
use std::path::Path;

use eyre::WrapErr;
use nixconverge_core::ResourceRecord;
use serde::{Deserialize, Serialize};

const STATE_VERSION: u32 = 1;

/// On-disk state: one record per deployment name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub deployments: BTreeMap<String, ResourceRecord>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            deployments: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Load state, treating a missing file as empty
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed, or has
    /// an unsupported version
    pub fn load(path: &Path) -> eyre::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading state {}", path.display()))?;
        let state: StateFile = serde_json::from_str(&content)
            .wrap_err_with(|| format!("parsing state {}", path.display()))?;

        if state.version != STATE_VERSION {
            eyre::bail!(
                "unsupported state version {} in {} (expected {STATE_VERSION})",
                state.version,
                path.display()
            );
        }
        Ok(state)
    }

    /// Write state atomically via a sibling temp file
    ///
    /// # Errors
    /// Returns error if the file cannot be written or renamed
    pub fn save(&self, path: &Path) -> eyre::Result<()> {
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)?;

        std::fs::write(&tmp, content).wrap_err_with(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .wrap_err_with(|| format!("replacing state {}", path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn record(&self, name: &str) -> ResourceRecord {
        self.deployments.get(name).cloned().unwrap_or_default()
    }

    /// Store `record`, dropping the entry if it has no identity
    pub fn put(&mut self, name: &str, record: ResourceRecord) {
        if record.is_created() {
            self.deployments.insert(name.to_string(), record);
        } else {
            self.deployments.remove(name);
        }
    }
}
