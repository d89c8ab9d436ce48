//! pideploy - Cross-compile and deploy the door-monitor service
//!
//! This crate provides the command line front end for pideploy-core:
//! - Argument parsing
//! - Console stage reporting with progress spinners
//! - Mapping pipeline results to exit codes

pub mod commands;
pub mod progress;
