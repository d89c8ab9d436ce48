//! Project configuration
//!
//! This module handles parsing of `pideploy.toml` and `pideploy.local.toml`.
//! The local file holds per-operator overrides and is merged over the
//! committed one: tables merge recursively, arrays and scalars replace.

use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Name of the committed configuration file
pub const CONFIG_FILE: &str = "pideploy.toml";

/// Name of the operator override file
pub const LOCAL_CONFIG_FILE: &str = "pideploy.local.toml";

/// Longest process name the kernel keeps in `comm`, which `pgrep -x` matches
pub const MAX_PROCESS_NAME_LEN: usize = 15;

/// Main configuration structure for pideploy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployed service settings
    pub service: ServiceConfig,

    /// Build settings
    pub build: BuildConfig,

    /// Remote host settings
    pub remote: RemoteConfig,
}

/// Settings describing the deployed service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Binary, process, unit and remote directory name (default: "door-monitor")
    pub name: String,

    /// Unit description (default: "Door Monitor Service")
    pub description: String,

    /// Configuration file name inside the remote directory (default: "config.json")
    pub config_file: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "door-monitor".to_string(),
            description: "Door Monitor Service".to_string(),
            config_file: "config.json".to_string(),
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Target used when `--target` is not given (default: "armv6")
    pub default_target: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            default_target: "armv6".to_string(),
        }
    }
}

/// Remote host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Connectivity probe timeout in seconds (default: 10)
    pub connect_timeout_secs: u64,

    /// Time to wait after SIGTERM before escalating (default: 2)
    pub stop_grace_secs: u64,

    /// systemd unit directory (default: "/etc/systemd/system")
    pub unit_dir: String,

    /// `RestartSec=` of the generated unit (default: 10)
    pub restart_sec: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            stop_grace_secs: 2,
            unit_dir: "/etc/systemd/system".to_string(),
            restart_sec: 10,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl Config {
    /// Load configuration from a project directory.
    ///
    /// This loads `pideploy.toml` and merges `pideploy.local.toml` over it if
    /// it exists. Missing files yield the defaults.
    pub fn load(project_root: &Utf8Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);
        let local_config_path = project_root.join(LOCAL_CONFIG_FILE);

        let base_config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<toml::Value>(&content)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let local_config = if local_config_path.exists() {
            let content = std::fs::read_to_string(&local_config_path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        } else {
            None
        };

        let merged = if let Some(local) = local_config {
            merge_toml_values(base_config, local)
        } else {
            base_config
        };

        let config: Config = merged.try_into()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a string (for testing)
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let name = &self.service.name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::config(
                format!("Invalid service name '{}'", name),
                "service.name may only contain ASCII letters, digits, '-' and '_'",
            ));
        }

        if name.len() > MAX_PROCESS_NAME_LEN {
            return Err(Error::config(
                format!(
                    "Service name '{}' is longer than {} characters",
                    name, MAX_PROCESS_NAME_LEN
                ),
                format!(
                    "Linux truncates process names to {} characters, so a running '{}' could never be found and stopped. Choose a shorter service.name",
                    MAX_PROCESS_NAME_LEN, name
                ),
            ));
        }

        // Rendered verbatim into `Description=` of the unit
        if self.service.description.contains(char::is_control) {
            return Err(Error::config(
                format!(
                    "Service description {:?} contains control characters",
                    self.service.description
                ),
                "service.description must be a single line of text",
            ));
        }

        if self.service.config_file.is_empty() || self.service.config_file.contains('/') {
            return Err(Error::config(
                format!("Invalid config file name '{}'", self.service.config_file),
                "service.config_file must be a plain file name such as \"config.json\"",
            ));
        }

        if !self.remote.unit_dir.starts_with('/') {
            return Err(Error::config(
                format!("Unit directory '{}' is not absolute", self.remote.unit_dir),
                "Set remote.unit_dir to an absolute path, e.g. \"/etc/systemd/system\"",
            ));
        }

        if self.remote.connect_timeout_secs == 0 {
            return Err(Error::config(
                "remote.connect_timeout_secs must be greater than zero",
                "The connectivity probe needs a bounded, non-zero timeout",
            ));
        }

        Ok(())
    }
}

/// Merge two TOML values:
/// - Tables: recursively merged
/// - Arrays: local replaces base (not merged)
/// - Primitives: local overrides base
fn merge_toml_values(base: toml::Value, local: toml::Value) -> toml::Value {
    match (base, local) {
        (toml::Value::Table(mut base_table), toml::Value::Table(local_table)) => {
            for (key, local_value) in local_table {
                if let Some(base_value) = base_table.remove(&key) {
                    base_table.insert(key, merge_toml_values(base_value, local_value));
                } else {
                    base_table.insert(key, local_value);
                }
            }
            toml::Value::Table(base_table)
        }
        (_, local) => local,
    }
}
