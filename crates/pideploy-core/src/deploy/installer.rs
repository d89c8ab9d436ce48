//! Artifact installation

use camino::{Utf8Path, Utf8PathBuf};

use crate::build::BuildArtifact;
use crate::remote::{RemoteCommand, RemoteOp, RemoteSession};
use crate::Result;

/// The artifact is on the device and executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub remote_path: Utf8PathBuf,
}

/// Copy `artifact` to `<remote_dir>/<binary_name>` and mark it executable.
///
/// Any previous binary is overwritten. Copy and chmod are one unit: the
/// result is `Installed` only when both succeeded.
pub fn install(
    session: &RemoteSession<'_>,
    artifact: &BuildArtifact,
    remote_dir: &Utf8Path,
    binary_name: &str,
) -> Result<Installed> {
    let remote_path = remote_dir.join(binary_name);
    tracing::info!(
        "Installing {} to {}:{}",
        artifact.path,
        session.endpoint(),
        remote_path
    );

    session.execute_checked(
        &RemoteOp::Run(RemoteCommand::new("mkdir").args(["-p", remote_dir.as_str()])),
        "Check that the remote user may create the install directory",
    )?;

    session.execute_checked(
        &RemoteOp::CopyFile {
            local: artifact.path.clone(),
            remote: remote_path.clone(),
        },
        "Check free space on the device and write permission on the install directory",
    )?;

    session.execute_checked(
        &RemoteOp::Run(RemoteCommand::new("chmod").args(["+x", remote_path.as_str()])),
        "The binary was copied but could not be made executable; re-run the deploy",
    )?;

    tracing::info!("Installed {}", remote_path);
    Ok(Installed { remote_path })
}
