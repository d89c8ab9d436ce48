//! Build orchestration
//!
//! This module drives the toolchain for one target (deploy path, fail-fast)
//! or for every known target (build-only path, best-effort), and locates the
//! resulting artifact on disk.

use std::fmt;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};

use super::toolchain::Toolchain;
use crate::target::{BuildMode, TARGETS, TargetSpec};
use crate::{Error, Result};

/// A binary produced by a successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub path: Utf8PathBuf,
    pub target: &'static TargetSpec,
    pub mode: BuildMode,
    /// Size in bytes
    pub size: u64,
    /// Blake3 hash of the file contents
    pub digest: String,
}

impl BuildArtifact {
    /// Inspect a file that the build left on disk
    pub fn from_path(path: &Utf8Path, target: &'static TargetSpec, mode: BuildMode) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            target,
            mode,
            size,
            digest: hash_file(path)?,
        })
    }
}

/// Outcome of building one target in a batch
#[derive(Debug)]
pub enum TargetBuild {
    Built(BuildArtifact),
    Failed {
        target: &'static TargetSpec,
        error: Error,
    },
}

impl TargetBuild {
    pub fn target(&self) -> &'static TargetSpec {
        match self {
            TargetBuild::Built(artifact) => artifact.target,
            TargetBuild::Failed { target, .. } => *target,
        }
    }
}

/// Result of building every known target
#[derive(Debug)]
pub struct BatchReport {
    pub mode: BuildMode,
    pub entries: Vec<TargetBuild>,
}

impl BatchReport {
    pub fn artifacts(&self) -> impl Iterator<Item = &BuildArtifact> {
        self.entries.iter().filter_map(|entry| match entry {
            TargetBuild::Built(artifact) => Some(artifact),
            TargetBuild::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&'static TargetSpec, &Error)> {
        self.entries.iter().filter_map(|entry| match entry {
            TargetBuild::Failed { target, error } => Some((*target, error)),
            TargetBuild::Built(_) => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build results ({}):", self.mode)?;
        for entry in &self.entries {
            match entry {
                TargetBuild::Built(artifact) => {
                    writeln!(f, "  {:<8} {}", artifact.target.id, artifact.path)?
                }
                TargetBuild::Failed { target, error } => {
                    writeln!(f, "  {:<8} FAILED: {}", target.id, error)?
                }
            }
        }
        Ok(())
    }
}

/// Drives a [`Toolchain`] and checks what it leaves on disk
pub struct Builder<'a> {
    toolchain: &'a dyn Toolchain,
    project_root: Utf8PathBuf,
    binary_name: String,
}

impl<'a> Builder<'a> {
    pub fn new(
        toolchain: &'a dyn Toolchain,
        project_root: &Utf8Path,
        binary_name: impl Into<String>,
    ) -> Self {
        Self {
            toolchain,
            project_root: project_root.to_path_buf(),
            binary_name: binary_name.into(),
        }
    }

    /// Where cargo places the binary for this target and mode
    pub fn artifact_path(&self, target: &TargetSpec, mode: BuildMode) -> Utf8PathBuf {
        self.project_root
            .join("target")
            .join(target.triple)
            .join(mode.profile_dir())
            .join(&self.binary_name)
    }

    /// Build one target and return its artifact
    pub fn build(&self, target: &'static TargetSpec, mode: BuildMode) -> Result<BuildArtifact> {
        tracing::info!("Building {} for {} ({})", self.binary_name, target, mode);

        self.ensure_target(target)?;
        self.toolchain.compile(target, mode)?;

        let path = self.artifact_path(target, mode);
        if !path.is_file() {
            return Err(Error::artifact_missing(target.id, path));
        }

        let artifact = BuildArtifact::from_path(&path, target, mode)?;
        tracing::info!(
            "Built {} ({} bytes, blake3 {})",
            artifact.path,
            artifact.size,
            &artifact.digest[..12]
        );
        Ok(artifact)
    }

    /// Build every known target one after another. A failing target is
    /// recorded and the remaining targets are still built.
    pub fn build_all(&self, mode: BuildMode) -> BatchReport {
        let entries = TARGETS
            .iter()
            .map(|target| match self.build(target, mode) {
                Ok(artifact) => TargetBuild::Built(artifact),
                Err(error) => {
                    tracing::error!("Build for {} failed: {}", target.id, error);
                    TargetBuild::Failed { target, error }
                }
            })
            .collect();

        BatchReport { mode, entries }
    }

    /// Install the target's standard library if rustup does not have it
    fn ensure_target(&self, target: &TargetSpec) -> Result<()> {
        if self.toolchain.is_target_installed(target)? {
            tracing::debug!("Target {} already installed", target.triple);
            return Ok(());
        }

        tracing::warn!("Target {} is not installed, installing", target.triple);
        self.toolchain.install_target(target)?;

        if !self.toolchain.is_target_installed(target)? {
            return Err(Error::toolchain(
                format!("Target {} is still missing after installation", target.triple),
                format!("Run `rustup target add {}` and check its output", target.triple),
            ));
        }
        Ok(())
    }
}

/// Blake3 hash of a file, hex encoded
fn hash_file(path: &Utf8Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut file = std::fs::File::open(path)?;
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
