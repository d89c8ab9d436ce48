//! OpenSSH transport
//!
//! Runs every [`RemoteOp`] through the system `ssh` and `scp` binaries in
//! batch mode, so a missing key never turns into a password prompt.

use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use super::{Endpoint, RemoteOp, RemoteOutput, Transport, shell_escape};
use crate::Result;

/// Transport backed by the OpenSSH client tools
#[derive(Debug, Clone)]
pub struct SshTransport {
    connect_timeout: Duration,
}

impl SshTransport {
    /// `connect_timeout` bounds connection setup of every ssh and scp call
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Options shared by ssh and scp
    fn common_options(timeout: Duration) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", timeout.as_secs().max(1)),
        ]
    }

    /// Arguments for `ssh` running `remote_command` on `endpoint`
    pub fn ssh_args(endpoint: &Endpoint, timeout: Duration, remote_command: &str) -> Vec<String> {
        let mut args = Self::common_options(timeout);
        if let Some(port) = endpoint.port() {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(endpoint.destination());
        args.push("--".to_string());
        args.push(remote_command.to_string());
        args
    }

    /// Arguments for `scp` copying `local` to `remote` on `endpoint`
    pub fn scp_args(endpoint: &Endpoint, timeout: Duration, local: &str, remote: &str) -> Vec<String> {
        let mut args = Self::common_options(timeout);
        if let Some(port) = endpoint.port() {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        args.push("--".to_string());
        args.push(local.to_string());
        args.push(endpoint.copy_destination(remote));
        args
    }

    /// Shell command line a non-copy operation runs on the device
    pub fn remote_command_line(op: &RemoteOp) -> Option<String> {
        match op {
            RemoteOp::TestReachability { .. } => Some("true".to_string()),
            RemoteOp::Run(cmd) => Some(cmd.to_shell()),
            RemoteOp::RunPrivileged(cmd) => Some(format!("sudo -n {}", cmd.to_shell())),
            RemoteOp::WriteFile {
                remote, privileged, ..
            } => {
                let tee = format!("tee {} > /dev/null", shell_escape(remote.as_str()));
                Some(if *privileged {
                    format!("sudo -n {}", tee)
                } else {
                    tee
                })
            }
            RemoteOp::CopyFile { .. } => None,
        }
    }

    fn run(mut command: Command, stdin: Option<&str>) -> Result<RemoteOutput> {
        tracing::debug!("Running: {:?}", command);

        let output: Output = match stdin {
            Some(contents) => {
                let mut child = command
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()?;
                if let Some(mut pipe) = child.stdin.take() {
                    // ssh closes stdin early when the connection fails; the
                    // exit status below carries the real error.
                    if let Err(e) = pipe.write_all(contents.as_bytes()) {
                        if e.kind() != std::io::ErrorKind::BrokenPipe {
                            return Err(e.into());
                        }
                    }
                }
                child.wait_with_output()?
            }
            None => command.stdin(Stdio::null()).output()?,
        };

        Ok(RemoteOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Transport for SshTransport {
    fn execute(&self, endpoint: &Endpoint, op: &RemoteOp) -> Result<RemoteOutput> {
        if let RemoteOp::CopyFile { local, remote } = op {
            let mut command = Command::new("scp");
            command.args(Self::scp_args(
                endpoint,
                self.connect_timeout,
                local.as_str(),
                remote.as_str(),
            ));
            return Self::run(command, None);
        }

        let timeout = match op {
            RemoteOp::TestReachability { timeout } => *timeout,
            _ => self.connect_timeout,
        };
        let remote_command = Self::remote_command_line(op).unwrap_or_default();

        let mut command = Command::new("ssh");
        command.args(Self::ssh_args(endpoint, timeout, &remote_command));

        let stdin = match op {
            RemoteOp::WriteFile { contents, .. } => Some(contents.as_str()),
            _ => None,
        };
        Self::run(command, stdin)
    }
}
