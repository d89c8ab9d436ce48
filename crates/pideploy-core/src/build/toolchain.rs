//! Cross-compilation toolchain
//!
//! Release builds go through `cross`, which compiles inside a container
//! carrying the matching C toolchain and produces a static musl binary.
//! Debug builds call `cargo` directly against the rustup target.

use std::process::Command as StdCommand;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::process::Command;

use super::command_logger::run_command_with_logging;
use crate::target::{BuildMode, TargetSpec};
use crate::{Error, Result};

/// The tools the build invoker drives
pub trait Toolchain {
    /// Whether the standard library for `target` is installed
    fn is_target_installed(&self, target: &TargetSpec) -> Result<bool>;

    /// Install the standard library for `target`
    fn install_target(&self, target: &TargetSpec) -> Result<()>;

    /// Compile the service for `target`. Success says nothing about the
    /// artifact; the caller checks the filesystem.
    fn compile(&self, target: &TargetSpec, mode: BuildMode) -> Result<()>;
}

/// rustup + cargo + cross
#[derive(Debug, Clone)]
pub struct CargoToolchain {
    project_root: Utf8PathBuf,
    binary_name: String,
}

impl CargoToolchain {
    pub fn new(project_root: &Utf8Path, binary_name: impl Into<String>) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            binary_name: binary_name.into(),
        }
    }

    /// Program and arguments of the compile command
    pub fn compile_command(&self, target: &TargetSpec, mode: BuildMode) -> (&'static str, Vec<String>) {
        let mut args = vec!["build".to_string()];
        if mode == BuildMode::Release {
            args.push("--release".to_string());
        }
        args.extend([
            "--target".to_string(),
            target.triple.to_string(),
            "--bin".to_string(),
            self.binary_name.clone(),
        ]);

        let program = match mode {
            BuildMode::Release => "cross",
            BuildMode::Debug => "cargo",
        };
        (program, args)
    }

    fn rustup(&self, args: &[&str]) -> Result<std::process::Output> {
        tracing::debug!("Running: rustup {}", args.join(" "));
        StdCommand::new("rustup")
            .args(args)
            .current_dir(&self.project_root)
            .output()
            .map_err(|e| {
                Error::toolchain(
                    format!("Failed to run rustup: {}", e),
                    "Install rustup from https://rustup.rs",
                )
            })
    }
}

impl Toolchain for CargoToolchain {
    fn is_target_installed(&self, target: &TargetSpec) -> Result<bool> {
        let output = self.rustup(&["target", "list", "--installed"])?;
        if !output.status.success() {
            return Err(Error::toolchain(
                format!(
                    "rustup target list failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                "Check your rustup installation",
            ));
        }

        let installed = String::from_utf8_lossy(&output.stdout);
        Ok(installed.lines().any(|line| line.trim() == target.triple))
    }

    fn install_target(&self, target: &TargetSpec) -> Result<()> {
        tracing::info!("Installing Rust target {}", target.triple);
        let output = self.rustup(&["target", "add", target.triple])?;
        if !output.status.success() {
            return Err(Error::toolchain(
                format!(
                    "rustup target add {} failed: {}",
                    target.triple,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                format!("Try running `rustup target add {}` manually", target.triple),
            ));
        }
        Ok(())
    }

    fn compile(&self, target: &TargetSpec, mode: BuildMode) -> Result<()> {
        let (program, args) = self.compile_command(target, mode);
        let operation = format!("{} build", program);

        let mut command = Command::new(program);
        command.args(&args).current_dir(&self.project_root);

        // Compilation is the only async work; it runs on a single thread and
        // the caller blocks until it finishes.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::toolchain(
                    format!("Failed to create async runtime: {}", e),
                    "This is likely a bug in pideploy",
                )
            })?;

        rt.block_on(run_command_with_logging(&mut command, target.id, &operation))
    }
}
