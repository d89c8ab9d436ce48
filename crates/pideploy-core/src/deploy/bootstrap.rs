//! Service configuration bootstrap
//!
//! The configuration document holds per-device endpoints and credentials
//! that the operator edits after the first install. It is written only when
//! the file does not exist yet.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::remote::{RemoteCommand, RemoteOp, RemoteSession};
use crate::{Error, Result};

/// Configuration document read by the door-monitor service.
///
/// The field names are shared with the service and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Door sensor status endpoint
    pub door_url: String,
    pub poll_interval_seconds: u64,
    /// How long the door may stay open before alerting
    pub open_threshold_seconds: u64,
    pub sms: SmsSettings,
}

/// SMS gateway credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub to_number: String,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            door_url: "http://192.168.1.100/rpc/Input.GetStatus?id=0".to_string(),
            poll_interval_seconds: 5,
            open_threshold_seconds: 15,
            sms: SmsSettings::default(),
        }
    }
}

impl ConfigDocument {
    /// Pretty-printed JSON with a trailing newline
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// What the bootstrapper did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created(Utf8PathBuf),
    AlreadyPresent(Utf8PathBuf),
}

/// Write `document` to `path` on the device unless something is already
/// there. An existing file is never touched.
pub fn bootstrap_config(
    session: &RemoteSession<'_>,
    path: &Utf8Path,
    document: &ConfigDocument,
) -> Result<BootstrapOutcome> {
    let exists = RemoteOp::Run(RemoteCommand::new("test").args(["-e", path.as_str()]));
    let output = session.execute(&exists)?;

    match output.code {
        Some(0) => {
            tracing::info!("Keeping existing configuration {}", path);
            return Ok(BootstrapOutcome::AlreadyPresent(path.to_path_buf()));
        }
        Some(1) => {}
        _ => {
            return Err(Error::remote(
                format!(
                    "Could not check for {} on {}: {}",
                    path,
                    session.endpoint(),
                    output.failure_reason()
                ),
                "The configuration file was left untouched; re-run the deploy",
            ));
        }
    }

    tracing::info!("Creating default configuration {}", path);
    session.execute_checked(
        &RemoteOp::WriteFile {
            remote: path.to_path_buf(),
            contents: document.to_json()?,
            privileged: false,
        },
        "Check write permission on the install directory",
    )?;

    Ok(BootstrapOutcome::Created(path.to_path_buf()))
}
