//! Stopping a previously running service instance
//!
//! ```text
//! Check ─┬─> NoneRunning
//!        └─> Found ─> GracefulStop ─┬─> Confirmed
//!                                   └─> StillRunning ─> ForcedStop ─> Confirmed
//! ```
//!
//! A failing SIGKILL is tolerated: the process may already be gone. What is
//! not tolerated is a process that survives the forced stop.

use std::time::Duration;

use super::{RemoteCommand, RemoteOp, RemoteSession};
use crate::{Error, Result};

/// States of the stop sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    Check,
    NoneRunning,
    Found,
    GracefulStop,
    StillRunning,
    ForcedStop,
    Confirmed,
}

/// Result of a step whose failure does not abort its stage
#[derive(Debug)]
pub enum StepOutcome {
    Succeeded,
    Tolerated(Error),
}

/// How the previous instance was dealt with
#[derive(Debug)]
pub enum StopOutcome {
    /// Nothing matched; no signal was sent
    NoneRunning,
    /// A running instance was stopped
    Stopped {
        /// SIGKILL was needed
        forced: bool,
        /// Steps that failed without affecting the result
        tolerated: Vec<Error>,
    },
}

/// Stop any process named exactly `process_name` on the device.
///
/// Sends SIGTERM, waits `grace`, and escalates to SIGKILL if the process is
/// still alive.
pub fn stop_existing(
    session: &RemoteSession<'_>,
    process_name: &str,
    grace: Duration,
) -> Result<StopOutcome> {
    let mut state = StopState::Check;
    let mut forced = false;
    let mut tolerated = Vec::new();

    loop {
        tracing::debug!(?state, process = process_name, "Stop sequence");
        state = match state {
            StopState::Check => {
                if is_running(session, process_name)? {
                    StopState::Found
                } else {
                    StopState::NoneRunning
                }
            }
            StopState::NoneRunning => {
                tracing::info!("No running {} instance found", process_name);
                return Ok(StopOutcome::NoneRunning);
            }
            StopState::Found => {
                tracing::info!("Found running {} instance", process_name);
                StopState::GracefulStop
            }
            StopState::GracefulStop => {
                let output = session.execute(&signal(process_name, "-TERM"))?;
                if output.success() {
                    std::thread::sleep(grace);
                    if is_running(session, process_name)? {
                        StopState::StillRunning
                    } else {
                        StopState::Confirmed
                    }
                } else {
                    tracing::warn!(
                        "SIGTERM to {} failed ({}), escalating",
                        process_name,
                        output.failure_reason()
                    );
                    StopState::ForcedStop
                }
            }
            StopState::StillRunning => {
                tracing::warn!(
                    "{} still running {}s after SIGTERM",
                    process_name,
                    grace.as_secs()
                );
                StopState::ForcedStop
            }
            StopState::ForcedStop => {
                forced = true;
                if let StepOutcome::Tolerated(e) = force_kill(session, process_name) {
                    tracing::warn!("Ignoring failed SIGKILL: {}", e);
                    tolerated.push(e);
                }
                std::thread::sleep(grace);
                if is_running(session, process_name)? {
                    return Err(Error::remote(
                        format!(
                            "{} is still running on {} after SIGKILL",
                            process_name,
                            session.endpoint()
                        ),
                        "Check whether the remote user may run sudo without a password, \
                         or stop the process manually",
                    ));
                }
                StopState::Confirmed
            }
            StopState::Confirmed => {
                tracing::info!("Stopped {}", process_name);
                return Ok(StopOutcome::Stopped { forced, tolerated });
            }
        };
    }
}

fn signal(process_name: &str, signal: &str) -> RemoteOp {
    RemoteOp::RunPrivileged(RemoteCommand::new("pkill").args([signal, "-x", process_name]))
}

fn force_kill(session: &RemoteSession<'_>, process_name: &str) -> StepOutcome {
    match session.execute_checked(
        &signal(process_name, "-KILL"),
        "The process may already have exited",
    ) {
        Ok(_) => StepOutcome::Succeeded,
        Err(e) => StepOutcome::Tolerated(e),
    }
}

/// `pgrep -x`: exit 0 means a match, 1 means none, anything else is an error
fn is_running(session: &RemoteSession<'_>, process_name: &str) -> Result<bool> {
    let op = RemoteOp::Run(RemoteCommand::new("pgrep").args(["-x", process_name]));
    let output = session.execute(&op)?;
    match output.code {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(Error::remote(
            format!(
                "Could not query processes on {}: {}",
                session.endpoint(),
                output.failure_reason()
            ),
            "pgrep (procps) must be installed on the device",
        )),
    }
}
