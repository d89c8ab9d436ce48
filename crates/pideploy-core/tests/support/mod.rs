//! In-memory stand-ins for the device and the toolchain

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use pideploy_core::build::Toolchain;
use pideploy_core::remote::{Endpoint, RemoteCommand, RemoteOp, RemoteOutput, Transport};
use pideploy_core::target::{BuildMode, TargetSpec};
use pideploy_core::Result;

/// Observable state of the fake device
#[derive(Debug, Default)]
pub struct DeviceState {
    pub files: BTreeMap<Utf8PathBuf, Vec<u8>>,
    pub dirs: BTreeSet<Utf8PathBuf>,
    pub executable: BTreeSet<Utf8PathBuf>,
    pub running: BTreeSet<String>,
    /// Processes that ignore SIGTERM
    pub ignores_term: BTreeSet<String>,
    /// Processes that survive SIGKILL
    pub unkillable: BTreeSet<String>,
    /// Processes that exit on their own just before SIGKILL arrives
    pub exits_before_kill: BTreeSet<String>,
    pub enabled_units: BTreeSet<String>,
    pub started_units: BTreeSet<String>,
    pub daemon_reloads: usize,
    /// `chmod` fails, as on a noexec mount
    pub chmod_fails: bool,
    /// `systemctl enable` fails even for a loaded unit
    pub enable_fails: bool,
    /// Every operation received, in order
    pub log: Vec<RemoteOp>,
}

impl DeviceState {
    pub fn file_text(&self, path: &str) -> Option<String> {
        self.files
            .get(Utf8Path::new(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Signals sent through pkill, e.g. `["-TERM", "-KILL"]`
    pub fn signals_sent(&self) -> Vec<String> {
        self.log
            .iter()
            .filter_map(|op| match op {
                RemoteOp::RunPrivileged(cmd) if cmd.program() == "pkill" => {
                    cmd.get_args().first().cloned()
                }
                _ => None,
            })
            .collect()
    }

    /// Whether anything other than the reachability test was attempted
    pub fn touched(&self) -> bool {
        self.log
            .iter()
            .any(|op| !matches!(op, RemoteOp::TestReachability { .. }))
    }
}

/// A device that interprets the commands pideploy sends
pub struct FakeDevice {
    reachable: bool,
    state: RefCell<DeviceState>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            reachable: true,
            state: RefCell::new(DeviceState::default()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    pub fn with_running(self, name: &str) -> Self {
        self.state.borrow_mut().running.insert(name.to_string());
        self
    }

    pub fn ignoring_term(self, name: &str) -> Self {
        self.state.borrow_mut().ignores_term.insert(name.to_string());
        self
    }

    pub fn unkillable(self, name: &str) -> Self {
        self.state.borrow_mut().unkillable.insert(name.to_string());
        self
    }

    pub fn exiting_before_kill(self, name: &str) -> Self {
        self.state
            .borrow_mut()
            .exits_before_kill
            .insert(name.to_string());
        self
    }

    pub fn failing_chmod(self) -> Self {
        self.state.borrow_mut().chmod_fails = true;
        self
    }

    pub fn failing_enable(self) -> Self {
        self.state.borrow_mut().enable_fails = true;
        self
    }

    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.state
            .borrow_mut()
            .files
            .insert(Utf8PathBuf::from(path), contents.as_bytes().to_vec());
        self
    }

    pub fn state(&self) -> std::cell::Ref<'_, DeviceState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, DeviceState> {
        self.state.borrow_mut()
    }
}

fn exit(code: i32) -> RemoteOutput {
    RemoteOutput {
        code: Some(code),
        ..Default::default()
    }
}

fn fail(code: i32, stderr: &str) -> RemoteOutput {
    RemoteOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: format!("{}\n", stderr),
    }
}

impl DeviceState {
    fn run(&mut self, cmd: &RemoteCommand) -> RemoteOutput {
        let args: Vec<&str> = cmd.get_args().iter().map(String::as_str).collect();
        match (cmd.program(), args.as_slice()) {
            ("test", ["-e", path]) => {
                let path = Utf8Path::new(path);
                if self.files.contains_key(path) || self.dirs.contains(path) {
                    exit(0)
                } else {
                    exit(1)
                }
            }
            ("mkdir", ["-p", path]) => {
                self.dirs.insert(Utf8PathBuf::from(*path));
                exit(0)
            }
            ("chmod", ["+x", path]) => {
                let path = Utf8PathBuf::from(*path);
                if self.chmod_fails {
                    fail(1, "chmod: changing permissions: Operation not permitted")
                } else if self.files.contains_key(&path) {
                    self.executable.insert(path);
                    exit(0)
                } else {
                    fail(1, "chmod: No such file or directory")
                }
            }
            ("pgrep", ["-x", name]) => {
                if self.running.contains(*name) {
                    exit(0)
                } else {
                    exit(1)
                }
            }
            _ => fail(127, &format!("{}: command not found", cmd.program())),
        }
    }

    fn run_privileged(&mut self, cmd: &RemoteCommand) -> RemoteOutput {
        let args: Vec<&str> = cmd.get_args().iter().map(String::as_str).collect();
        match (cmd.program(), args.as_slice()) {
            ("pkill", [signal, "-x", name]) => {
                if !self.running.contains(*name) {
                    return exit(1);
                }
                if *signal == "-KILL" && self.exits_before_kill.contains(*name) {
                    self.running.remove(*name);
                    return exit(1);
                }
                let survives = match *signal {
                    "-TERM" => self.ignores_term.contains(*name) || self.unkillable.contains(*name),
                    "-KILL" => self.unkillable.contains(*name),
                    _ => true,
                };
                if !survives {
                    self.running.remove(*name);
                }
                exit(0)
            }
            ("systemctl", ["daemon-reload"]) => {
                self.daemon_reloads += 1;
                exit(0)
            }
            ("systemctl", ["enable", unit]) => {
                let loaded = self
                    .files
                    .keys()
                    .any(|path| path.file_name() == Some(*unit));
                if self.enable_fails {
                    fail(1, "Failed to enable unit: Access denied")
                } else if loaded && self.daemon_reloads > 0 {
                    self.enabled_units.insert(unit.to_string());
                    exit(0)
                } else {
                    fail(1, &format!("Failed to enable unit: Unit file {} does not exist.", unit))
                }
            }
            ("systemctl", ["start", unit]) => {
                self.started_units.insert(unit.to_string());
                exit(0)
            }
            _ => fail(1, "sudo: a password is required"),
        }
    }
}

impl Transport for FakeDevice {
    fn execute(&self, endpoint: &Endpoint, op: &RemoteOp) -> Result<RemoteOutput> {
        let mut state = self.state.borrow_mut();
        state.log.push(op.clone());

        let output = match op {
            RemoteOp::TestReachability { timeout } => {
                if self.reachable {
                    exit(0)
                } else {
                    fail(
                        255,
                        &format!(
                            "ssh: connect to host {} port 22: Connection timed out after {}s",
                            endpoint.host(),
                            timeout.as_secs()
                        ),
                    )
                }
            }
            RemoteOp::Run(cmd) => state.run(cmd),
            RemoteOp::RunPrivileged(cmd) => state.run_privileged(cmd),
            RemoteOp::CopyFile { local, remote } => {
                let bytes = std::fs::read(local)?;
                state.files.insert(remote.clone(), bytes);
                exit(0)
            }
            RemoteOp::WriteFile {
                remote,
                contents,
                privileged,
            } => {
                if remote.starts_with("/etc") && !privileged {
                    fail(1, "tee: Permission denied")
                } else {
                    state
                        .files
                        .insert(remote.clone(), contents.as_bytes().to_vec());
                    exit(0)
                }
            }
        };
        Ok(output)
    }
}

/// A toolchain that writes fake binaries where cargo would
pub struct FakeToolchain {
    project_root: Utf8PathBuf,
    binary_name: String,
    /// Triples whose standard library is not installed
    missing: RefCell<BTreeSet<String>>,
    /// Triples whose installation fails
    install_fails: BTreeSet<String>,
    /// Triples whose compile exits zero without writing an artifact
    withholds: BTreeSet<String>,
    /// Every call, e.g. `compile armv6 release`
    pub calls: RefCell<Vec<String>>,
}

impl FakeToolchain {
    pub fn new(project_root: &Utf8Path, binary_name: &str) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            binary_name: binary_name.to_string(),
            missing: RefCell::new(BTreeSet::new()),
            install_fails: BTreeSet::new(),
            withholds: BTreeSet::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_missing_target(self, triple: &str) -> Self {
        self.missing.borrow_mut().insert(triple.to_string());
        self
    }

    pub fn with_failing_install(mut self, triple: &str) -> Self {
        self.install_fails.insert(triple.to_string());
        self
    }

    pub fn withholding_artifact(mut self, triple: &str) -> Self {
        self.withholds.insert(triple.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Toolchain for FakeToolchain {
    fn is_target_installed(&self, target: &TargetSpec) -> Result<bool> {
        self.calls
            .borrow_mut()
            .push(format!("check {}", target.id));
        Ok(!self.missing.borrow().contains(target.triple))
    }

    fn install_target(&self, target: &TargetSpec) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("install {}", target.id));
        if self.install_fails.contains(target.triple) {
            return Err(pideploy_core::Error::toolchain(
                format!("rustup target add {} failed: network unreachable", target.triple),
                "Try again later",
            ));
        }
        self.missing.borrow_mut().remove(target.triple);
        Ok(())
    }

    fn compile(&self, target: &TargetSpec, mode: BuildMode) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("compile {} {}", target.id, mode));
        if self.withholds.contains(target.triple) {
            return Ok(());
        }

        let dir = self
            .project_root
            .join("target")
            .join(target.triple)
            .join(mode.profile_dir());
        std::fs::create_dir_all(&dir)?;
        std::fs::write(
            dir.join(&self.binary_name),
            format!("ELF {} {}", target.triple, mode),
        )?;
        Ok(())
    }
}

/// Temporary project directory as a UTF-8 path
pub fn temp_project() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp path is UTF-8");
    (dir, root)
}
