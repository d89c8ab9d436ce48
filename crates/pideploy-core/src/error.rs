//! Error types for pideploy

// This warning is a false positive from thiserror macro expansion
#![allow(unused_assignments)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for pideploy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pideploy
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[help]
        help: String,
    },

    /// Bad or missing command line input
    #[error("Invalid request: {message}")]
    Validation {
        message: String,
        #[help]
        help: String,
    },

    /// Requested architecture is not one of the known targets
    #[error("Unsupported target '{requested}' (valid targets: {})", .valid.join(", "))]
    UnsupportedTarget {
        requested: String,
        valid: Vec<String>,
    },

    /// Deploying without a remote host
    #[error("A remote host is required to deploy")]
    #[diagnostic(help("Pass --host <address>, or use --build-only to skip deployment"))]
    MissingHost,

    /// Missing or failing cross-compilation support
    #[error("Toolchain error: {message}")]
    Toolchain {
        message: String,
        #[help]
        help: String,
    },

    /// Build reported success but produced no binary
    #[error("Build for {target} finished but no artifact was found at {path}")]
    #[diagnostic(help(
        "Check that the package builds a binary with this name and that the target directory is not redirected (CARGO_TARGET_DIR)"
    ))]
    ArtifactMissing { target: String, path: Utf8PathBuf },

    /// Connectivity probe failed
    #[error("Cannot reach {destination}: {message}")]
    Unreachable {
        destination: String,
        message: String,
        #[help]
        help: String,
    },

    /// A remote command returned a non-zero result
    #[error("Remote operation failed: {message}")]
    RemoteOperation {
        message: String,
        #[help]
        help: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create an unsupported target error
    pub fn unsupported_target(requested: impl Into<String>, valid: Vec<String>) -> Self {
        Self::UnsupportedTarget {
            requested: requested.into(),
            valid,
        }
    }

    /// Create a toolchain error
    pub fn toolchain(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Toolchain {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create an artifact missing error
    pub fn artifact_missing(target: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self::ArtifactMissing {
            target: target.into(),
            path: path.into(),
        }
    }

    /// Create an unreachable host error
    pub fn unreachable(destination: impl Into<String>, message: impl Into<String>) -> Self {
        let destination = destination.into();
        let help = format!(
            "Check that the device is powered on and connected to the network, \
             that SSH is enabled on it, and that key-based login works without a \
             password (ssh-copy-id {destination})"
        );
        Self::Unreachable {
            destination,
            message: message.into(),
            help,
        }
    }

    /// Create a remote operation error
    pub fn remote(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::RemoteOperation {
            message: message.into(),
            help: help.into(),
        }
    }
}
