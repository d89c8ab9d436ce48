//! Deploy state management
//!
//! After a successful deploy, a record of what was installed is kept under
//! the project's state directory, one file per host.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Directory for pideploy internal files, relative to the project root
pub const STATE_DIR: &str = ".pideploy";

/// Record of the last successful deploy to a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployState {
    /// Timestamp of the deploy
    pub timestamp: DateTime<Utc>,
    /// Target identifier the artifact was built for
    pub target: String,
    /// Build profile
    pub mode: String,
    pub user: String,
    pub remote_dir: Utf8PathBuf,
    /// Blake3 hash of the installed binary
    pub artifact_digest: String,
}

impl DeployState {
    /// State file for `host` under `project_root`
    pub fn path_for(project_root: &Utf8Path, host: &str) -> Utf8PathBuf {
        // IPv6 hosts contain ':' which is awkward in file names
        let host_dir: String = host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        project_root
            .join(STATE_DIR)
            .join("deploy")
            .join(host_dir)
            .join("last_deploy.json")
    }

    /// Load deploy state from a file
    pub fn load(path: &Utf8Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content).map_err(|e| {
            Error::config(
                format!("Failed to parse deploy state {}: {}", path, e),
                "The deploy state file may be corrupted. Try deleting it.",
            )
        })?;

        Ok(Some(state))
    }

    /// Save deploy state to a file
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
