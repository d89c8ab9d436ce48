//! Cross-compilation of the service
//!
//! This module provides:
//! - The [`Toolchain`] seam and its rustup/cargo/cross implementation
//! - Streaming of compiler output into tracing
//! - The [`Builder`], which verifies artifacts on disk rather than trusting
//!   exit codes

mod builder;
mod command_logger;
mod toolchain;

pub use builder::{BatchReport, BuildArtifact, Builder, TargetBuild};
pub use command_logger::run_command_with_logging;
pub use toolchain::{CargoToolchain, Toolchain};
