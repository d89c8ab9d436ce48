//! systemd unit synthesis
//!
//! The unit belongs to pideploy, not to the operator: it is regenerated and
//! overwritten on every deploy. It is enabled for boot but never started.

use camino::{Utf8Path, Utf8PathBuf};

use crate::remote::{RemoteCommand, RemoteOp, RemoteSession};
use crate::Result;

/// Everything the unit template needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnitDescriptor {
    /// Unit name without the `.service` suffix
    pub name: String,
    pub description: String,
    pub user: String,
    pub working_directory: Utf8PathBuf,
    /// The service is started without arguments and finds its
    /// configuration in the working directory
    pub exec_path: Utf8PathBuf,
    pub restart_sec: u64,
}

impl ServiceUnitDescriptor {
    /// `<name>.service`
    pub fn file_name(&self) -> String {
        format!("{}.service", self.name)
    }

    /// Render the unit file
    pub fn render(&self) -> String {
        format!(
            "[Unit]\n\
             Description={description}\n\
             After=network-online.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             User={user}\n\
             WorkingDirectory={workdir}\n\
             ExecStart={exec}\n\
             Restart=always\n\
             RestartSec={restart_sec}\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            description = self.description,
            user = self.user,
            workdir = self.working_directory,
            exec = self.exec_path,
            restart_sec = self.restart_sec,
        )
    }
}

/// The unit is written, loaded and enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub unit_path: Utf8PathBuf,
}

/// Write the unit into `unit_dir`, reload systemd and enable the unit
pub fn synthesize(
    session: &RemoteSession<'_>,
    unit: &ServiceUnitDescriptor,
    unit_dir: &Utf8Path,
) -> Result<Registered> {
    let unit_path = unit_dir.join(unit.file_name());
    tracing::info!("Writing service unit {}", unit_path);

    const SUDO_HELP: &str = "The remote user needs passwordless sudo to manage systemd units";

    session.execute_checked(
        &RemoteOp::WriteFile {
            remote: unit_path.clone(),
            contents: unit.render(),
            privileged: true,
        },
        SUDO_HELP,
    )?;

    session.execute_checked(
        &RemoteOp::RunPrivileged(RemoteCommand::new("systemctl").arg("daemon-reload")),
        SUDO_HELP,
    )?;

    session.execute_checked(
        &RemoteOp::RunPrivileged(
            RemoteCommand::new("systemctl")
                .arg("enable")
                .arg(unit.file_name()),
        ),
        SUDO_HELP,
    )?;

    tracing::info!("Enabled {} (not started)", unit.file_name());
    Ok(Registered { unit_path })
}
