//! pideploy-core - Core library for pideploy
//!
//! This crate provides the build-and-deploy pipeline for the door-monitor
//! service, including:
//! - Configuration file parsing and merging
//! - Target resolution and request validation
//! - Cross-compilation through rustup, cargo and cross
//! - Typed remote operations over ssh/scp
//! - Service installation, systemd unit registration and config bootstrap

pub mod build;
pub mod config;
pub mod deploy;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod request;
pub mod target;

pub use error::{Error, Result};
