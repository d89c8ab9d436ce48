//! Remote operations
//!
//! Everything pideploy does on the device goes through a small closed set of
//! typed operations ([`RemoteOp`]) executed by a [`Transport`]. Commands are
//! kept as program plus arguments until the transport renders them, so
//! quoting happens in exactly one place ([`RemoteCommand::to_shell`]).
//!
//! Destructive operations require a [`RemoteSession`], which can only be
//! obtained from a successful connectivity probe.

mod probe;
mod process;
mod ssh;

use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;

use crate::{Error, Result};

pub use probe::probe;
pub use process::{StepOutcome, StopOutcome, StopState, stop_existing};
pub use ssh::SshTransport;

/// A remote login target: `user@host`, optionally on a non-standard port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    user: String,
    host: String,
    port: Option<u16>,
}

impl Endpoint {
    /// Build an endpoint from a user and a host string.
    ///
    /// The host may carry a port suffix (`pi.local:2222`). Bare IPv6
    /// addresses are taken as-is.
    pub fn parse(user: &str, host: &str) -> Result<Self> {
        let host = host.trim();
        let (host, port) = parse_host_port(host);

        if host.is_empty() || host.starts_with('-') || host.contains(char::is_whitespace) {
            return Err(Error::validation(
                format!("Invalid remote host '{}'", host),
                "Pass a host name or IP address with --host, e.g. --host raspberrypi.local",
            ));
        }
        if user.is_empty() || user.starts_with('-') || user.contains(['@', ' ', '/']) {
            return Err(Error::validation(
                format!("Invalid remote user '{}'", user),
                "Pass a plain login name with --user",
            ));
        }

        Ok(Self {
            user: user.to_string(),
            host: host.to_string(),
            port,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `user@host` as understood by ssh and scp
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// `user@host:path` as understood by scp. IPv6 hosts are bracketed,
    /// since scp splits the path off at the first colon.
    pub fn copy_destination(&self, remote_path: &str) -> String {
        if self.host.contains(':') {
            format!("{}@[{}]:{}", self.user, self.host, remote_path)
        } else {
            format!("{}@{}:{}", self.user, self.host, remote_path)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}@{}:{}", self.user, self.host, port),
            None => write!(f, "{}@{}", self.user, self.host),
        }
    }
}

/// Split an optional `:port` suffix off a host.
///
/// Only a suffix that parses as a `u16` is treated as a port, and hosts with
/// more than one colon (IPv6) are never split.
fn parse_host_port(host: &str) -> (&str, Option<u16>) {
    if host.matches(':').count() == 1 {
        if let Some((host_part, port_str)) = host.rsplit_once(':') {
            if let Ok(port) = port_str.parse::<u16>() {
                return (host_part, Some(port));
            }
        }
    }
    (host, None)
}

/// A command to run on the device, kept unrendered until execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    program: String,
    args: Vec<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Render for a POSIX shell, every word single-quoted
    pub fn to_shell(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|word| shell_escape(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Escape a string for shell use
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// The closed set of operations pideploy performs on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    /// Non-interactive round trip bounded by a timeout
    TestReachability { timeout: Duration },
    /// Run a command as the login user
    Run(RemoteCommand),
    /// Run a command through non-interactive sudo
    RunPrivileged(RemoteCommand),
    /// Copy a local file to a remote path, overwriting it
    CopyFile {
        local: Utf8PathBuf,
        remote: Utf8PathBuf,
    },
    /// Write `contents` to a remote path, overwriting it
    WriteFile {
        remote: Utf8PathBuf,
        contents: String,
        privileged: bool,
    },
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOp::TestReachability { timeout } => {
                write!(f, "reachability test ({}s timeout)", timeout.as_secs())
            }
            RemoteOp::Run(cmd) => write!(f, "{}", cmd),
            RemoteOp::RunPrivileged(cmd) => write!(f, "sudo {}", cmd),
            RemoteOp::CopyFile { local, remote } => write!(f, "copy {} -> {}", local, remote),
            RemoteOp::WriteFile {
                remote, privileged, ..
            } => {
                if *privileged {
                    write!(f, "sudo write {}", remote)
                } else {
                    write!(f, "write {}", remote)
                }
            }
        }
    }
}

/// Result of a remote operation that the transport managed to carry out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last non-empty stderr line, or the exit code when stderr is silent
    pub fn failure_reason(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Carries out remote operations against an endpoint.
///
/// Implementations return `Err` only when the operation could not be
/// attempted at all (e.g. the ssh binary is missing). A command that ran and
/// failed is reported through [`RemoteOutput::code`].
pub trait Transport {
    fn execute(&self, endpoint: &Endpoint, op: &RemoteOp) -> Result<RemoteOutput>;
}

/// An endpoint confirmed reachable by [`probe`] during this run
pub struct RemoteSession<'a> {
    transport: &'a dyn Transport,
    endpoint: Endpoint,
}

impl<'a> RemoteSession<'a> {
    pub(crate) fn new(transport: &'a dyn Transport, endpoint: Endpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Execute an operation, returning its output whatever the exit code
    pub fn execute(&self, op: &RemoteOp) -> Result<RemoteOutput> {
        tracing::debug!(endpoint = %self.endpoint, "Remote: {}", op);
        self.transport.execute(&self.endpoint, op)
    }

    /// Execute an operation that must succeed
    pub fn execute_checked(&self, op: &RemoteOp, help: &str) -> Result<RemoteOutput> {
        let output = self.execute(op)?;
        if !output.success() {
            return Err(Error::remote(
                format!("{} on {}: {}", op, self.endpoint, output.failure_reason()),
                help,
            ));
        }
        Ok(output)
    }
}

impl fmt::Debug for RemoteSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("simple"), "'simple'");
        assert_eq!(shell_escape("with space"), "'with space'");
        assert_eq!(shell_escape("it's quoted"), "'it'\\''s quoted'");
    }

    #[test]
    fn test_command_to_shell() {
        let cmd = RemoteCommand::new("mkdir")
            .arg("-p")
            .arg("/home/pi/door monitor");
        assert_eq!(cmd.to_shell(), "'mkdir' '-p' '/home/pi/door monitor'");
        assert_eq!(cmd.to_string(), "mkdir -p /home/pi/door monitor");
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint = Endpoint::parse("pi", "raspberrypi.local").unwrap();
        assert_eq!(endpoint.destination(), "pi@raspberrypi.local");
        assert_eq!(endpoint.port(), None);

        let endpoint = Endpoint::parse("admin", "192.168.1.100:2222").unwrap();
        assert_eq!(endpoint.destination(), "admin@192.168.1.100");
        assert_eq!(endpoint.port(), Some(2222));
        assert_eq!(endpoint.to_string(), "admin@192.168.1.100:2222");
    }

    #[test]
    fn test_endpoint_parse_edge_cases() {
        // Not a port
        let endpoint = Endpoint::parse("pi", "host:invalid").unwrap();
        assert_eq!(endpoint.host(), "host:invalid");

        // Port out of range
        let endpoint = Endpoint::parse("pi", "host:99999").unwrap();
        assert_eq!(endpoint.host(), "host:99999");
        assert_eq!(endpoint.port(), None);

        // IPv6 is never split
        let endpoint = Endpoint::parse("pi", "fe80::1").unwrap();
        assert_eq!(endpoint.host(), "fe80::1");
        assert_eq!(endpoint.port(), None);
    }

    #[test]
    fn test_endpoint_rejects_option_injection() {
        assert!(Endpoint::parse("pi", "-oProxyCommand=evil").is_err());
        assert!(Endpoint::parse("-l", "pi.local").is_err());
        assert!(Endpoint::parse("pi", "").is_err());
        assert!(Endpoint::parse("pi@x", "pi.local").is_err());
    }

    #[test]
    fn test_failure_reason() {
        let output = RemoteOutput {
            code: Some(255),
            stdout: String::new(),
            stderr: "warning: something\nssh: connect to host pi.local port 22: Connection timed out\n"
                .to_string(),
        };
        assert_eq!(
            output.failure_reason(),
            "ssh: connect to host pi.local port 22: Connection timed out"
        );

        let silent = RemoteOutput {
            code: Some(3),
            ..Default::default()
        };
        assert_eq!(silent.failure_reason(), "exit code 3");
    }
}
