//! Supported hardware targets and build modes

use std::fmt;

use crate::{Error, Result};

/// A known cross-compilation target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    /// Identifier accepted on the command line
    pub id: &'static str,
    /// Human-readable device description
    pub description: &'static str,
    /// Rust target triple
    pub triple: &'static str,
}

/// The closed set of targets pideploy can build for.
///
/// musl triples produce statically linked binaries, so the artifact does not
/// depend on the glibc version shipped by the device image.
pub const TARGETS: &[TargetSpec] = &[
    TargetSpec {
        id: "armv6",
        description: "Raspberry Pi Zero / 1 (32-bit ARMv6, hard-float)",
        triple: "arm-unknown-linux-musleabihf",
    },
    TargetSpec {
        id: "aarch64",
        description: "Raspberry Pi 3 / 4 / 5 / Zero 2 (64-bit ARMv8)",
        triple: "aarch64-unknown-linux-musl",
    },
];

impl TargetSpec {
    /// Look up a target by identifier
    pub fn find(id: &str) -> Result<&'static TargetSpec> {
        let id = id.trim();
        TARGETS
            .iter()
            .find(|t| t.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| Error::unsupported_target(id, Self::ids()))
    }

    /// Identifiers of every known target
    pub fn ids() -> Vec<String> {
        TARGETS.iter().map(|t| t.id.to_string()).collect()
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.triple)
    }
}

/// Compilation profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildMode {
    #[default]
    Debug,
    Release,
}

impl BuildMode {
    pub fn from_release_flag(release: bool) -> Self {
        if release {
            BuildMode::Release
        } else {
            BuildMode::Debug
        }
    }

    /// Directory cargo places artifacts in for this profile
    pub fn profile_dir(&self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile_dir())
    }
}
