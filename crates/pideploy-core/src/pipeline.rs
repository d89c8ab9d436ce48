//! Pipeline orchestration
//!
//! ```text
//! Validate ─> Build ─┬─> (build-only) BatchReport
//!                    └─> Probe ─> StopExisting ─> Install ─> Synthesize
//!                                 ─> BootstrapConfig ─> RecordState
//! ```
//!
//! Stages run strictly one after another. The first failure halts the run
//! and nothing is rolled back.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use miette::Diagnostic;
use thiserror::Error;

use crate::build::{BatchReport, BuildArtifact, Builder, Toolchain};
use crate::config::Config;
use crate::deploy::{
    BootstrapOutcome, ConfigDocument, DeployState, ServiceUnitDescriptor, bootstrap_config,
    install, synthesize,
};
use crate::remote::{Endpoint, StopOutcome, Transport, probe, stop_existing};
use crate::request::{DeployArgs, DeployRequest, resolve};
use crate::target::TARGETS;
use crate::Error;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Build,
    Probe,
    StopExisting,
    Install,
    Synthesize,
    BootstrapConfig,
    RecordState,
}

impl Stage {
    /// Stages of a build-only run
    pub const BUILD_ONLY: &'static [Stage] = &[Stage::Validate, Stage::Build];

    /// Stages of a full deploy
    pub const DEPLOY: &'static [Stage] = &[
        Stage::Validate,
        Stage::Build,
        Stage::Probe,
        Stage::StopExisting,
        Stage::Install,
        Stage::Synthesize,
        Stage::BootstrapConfig,
        Stage::RecordState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Validate => "Validate",
            Stage::Build => "Build",
            Stage::Probe => "Probe",
            Stage::StopExisting => "Stop existing",
            Stage::Install => "Install",
            Stage::Synthesize => "Synthesize unit",
            Stage::BootstrapConfig => "Bootstrap config",
            Stage::RecordState => "Record state",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage failed and the run was halted
#[derive(Debug, Error, Diagnostic)]
#[error("{stage} stage failed")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    #[diagnostic_source]
    pub cause: Error,
}

/// Receives stage progress
pub trait StageReporter {
    fn started(&self, stage: Stage);
    fn finished(&self, stage: Stage);
    fn failed(&self, stage: Stage, error: &Error);
    /// The stage failed but the run carries on
    fn tolerated(&self, stage: Stage, error: &Error);
}

/// Reports stages through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl StageReporter for LogReporter {
    fn started(&self, stage: Stage) {
        tracing::info!("==> {}", stage);
    }

    fn finished(&self, stage: Stage) {
        tracing::info!("<== {} done", stage);
    }

    fn failed(&self, stage: Stage, error: &Error) {
        tracing::error!("<== {} failed: {}", stage, error);
    }

    fn tolerated(&self, stage: Stage, error: &Error) {
        tracing::warn!("<== {} failed, continuing: {}", stage, error);
    }
}

/// What a dry run would do
#[derive(Debug, Clone)]
pub struct Plan {
    pub request: DeployRequest,
    pub stages: &'static [Stage],
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request = &self.request;
        writeln!(f, "Dry run, nothing will be built or changed")?;
        writeln!(f, "  mode:    {}", request.mode())?;

        match request.destination() {
            None => {
                let targets: Vec<_> = TARGETS.iter().map(ToString::to_string).collect();
                writeln!(f, "  targets: {}", targets.join(", "))?;
            }
            Some(destination) => {
                let service = request.service();
                writeln!(f, "  target:  {}", request.target())?;
                writeln!(f, "  host:    {}", destination.endpoint)?;
                writeln!(f, "  binary:  {}", destination.binary_path(service))?;
                writeln!(
                    f,
                    "  unit:    {}/{}.service",
                    request.remote().unit_dir,
                    service.name
                )?;
                writeln!(
                    f,
                    "  config:  {} (created if absent)",
                    destination.config_path(service)
                )?;
            }
        }

        let stages: Vec<_> = self.stages.iter().map(Stage::name).collect();
        write!(f, "  stages:  {}", stages.join(" -> "))
    }
}

/// A completed deploy
#[derive(Debug)]
pub struct DeploySummary {
    pub service: String,
    pub endpoint: Endpoint,
    pub artifact: BuildArtifact,
    pub binary_path: Utf8PathBuf,
    pub unit_path: Utf8PathBuf,
    pub stop: StopOutcome,
    pub config: BootstrapOutcome,
}

impl fmt::Display for DeploySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Deployed {} ({}, {}) to {}",
            self.service, self.artifact.target.id, self.artifact.mode, self.endpoint
        )?;
        writeln!(f, "  binary: {}", self.binary_path)?;
        writeln!(f, "  unit:   {} (enabled, not started)", self.unit_path)?;

        let config_path = match &self.config {
            BootstrapOutcome::Created(path) => {
                writeln!(f, "  config: {} (created with defaults)", path)?;
                path
            }
            BootstrapOutcome::AlreadyPresent(path) => {
                writeln!(f, "  config: {} (kept existing)", path)?;
                path
            }
        };

        writeln!(f)?;
        writeln!(f, "Next steps:")?;
        let ssh = match self.endpoint.port() {
            Some(port) => format!("ssh -p {} {}", port, self.endpoint.destination()),
            None => format!("ssh {}", self.endpoint.destination()),
        };
        let mut step = 1;
        if matches!(self.config, BootstrapOutcome::Created(_)) {
            writeln!(
                f,
                "  {}. Fill in the door URL and SMS credentials: {} nano {}",
                step, ssh, config_path
            )?;
            step += 1;
        }
        writeln!(
            f,
            "  {}. Start the service: {} sudo systemctl start {}",
            step, ssh, self.service
        )?;
        write!(
            f,
            "  {}. Follow its logs: {} journalctl -u {} -f",
            step + 1,
            ssh,
            self.service
        )
    }
}

/// Final result of a pipeline run
#[derive(Debug)]
pub enum Summary {
    BuildOnly(BatchReport),
    Deployed(Box<DeploySummary>),
    DryRun(Plan),
}

impl Summary {
    /// A build-only batch with a failed target does not succeed
    pub fn is_success(&self) -> bool {
        match self {
            Summary::BuildOnly(report) => !report.has_failures(),
            Summary::Deployed(_) | Summary::DryRun(_) => true,
        }
    }

    /// Process exit code for this summary
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Summary::BuildOnly(report) => write!(f, "{}", report),
            Summary::Deployed(summary) => write!(f, "{}", summary),
            Summary::DryRun(plan) => write!(f, "{}", plan),
        }
    }
}

/// Sequences the build and deploy stages
pub struct Pipeline<'a> {
    toolchain: &'a dyn Toolchain,
    transport: &'a dyn Transport,
    reporter: &'a dyn StageReporter,
    project_root: Utf8PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        toolchain: &'a dyn Toolchain,
        transport: &'a dyn Transport,
        reporter: &'a dyn StageReporter,
        project_root: &Utf8Path,
    ) -> Self {
        Self {
            toolchain,
            transport,
            reporter,
            project_root: project_root.to_path_buf(),
        }
    }

    /// Resolve the request, then run it
    pub fn execute(
        &self,
        args: &DeployArgs,
        config: &Config,
    ) -> std::result::Result<Summary, PipelineError> {
        let request = self.stage(Stage::Validate, || resolve(args, config))?;
        self.run(&request)
    }

    /// Run a resolved request
    pub fn run(&self, request: &DeployRequest) -> std::result::Result<Summary, PipelineError> {
        if request.dry_run() {
            let stages = if request.build_only() {
                Stage::BUILD_ONLY
            } else {
                Stage::DEPLOY
            };
            return Ok(Summary::DryRun(Plan {
                request: request.clone(),
                stages,
            }));
        }

        let service = request.service();
        let builder = Builder::new(self.toolchain, &self.project_root, &service.name);

        if request.build_only() {
            let report = self.stage(Stage::Build, || Ok(builder.build_all(request.mode())))?;
            if report.has_failures() {
                tracing::warn!("Some targets failed to build");
            }
            return Ok(Summary::BuildOnly(report));
        }

        let destination = request.destination().ok_or_else(|| PipelineError {
            stage: Stage::Validate,
            cause: Error::MissingHost,
        })?;
        let remote = request.remote();

        let artifact = self.stage(Stage::Build, || {
            builder.build(request.target(), request.mode())
        })?;

        let session = self.stage(Stage::Probe, || {
            probe(
                self.transport,
                &destination.endpoint,
                remote.connect_timeout(),
            )
        })?;

        let stop = self.stage(Stage::StopExisting, || {
            stop_existing(&session, &service.name, remote.stop_grace())
        })?;

        let installed = self.stage(Stage::Install, || {
            install(&session, &artifact, &destination.remote_dir, &service.name)
        })?;

        let unit = ServiceUnitDescriptor {
            name: service.name.clone(),
            description: service.description.clone(),
            user: destination.endpoint.user().to_string(),
            working_directory: destination.remote_dir.clone(),
            exec_path: installed.remote_path.clone(),
            restart_sec: remote.restart_sec,
        };
        let registered = self.stage(Stage::Synthesize, || {
            synthesize(&session, &unit, Utf8Path::new(&remote.unit_dir))
        })?;

        let config = self.stage(Stage::BootstrapConfig, || {
            bootstrap_config(
                &session,
                &destination.config_path(service),
                &ConfigDocument::default(),
            )
        })?;

        let state = DeployState {
            timestamp: Utc::now(),
            target: request.target().id.to_string(),
            mode: request.mode().to_string(),
            user: destination.endpoint.user().to_string(),
            remote_dir: destination.remote_dir.clone(),
            artifact_digest: artifact.digest.clone(),
        };
        self.record_state(&destination.endpoint, &state);

        Ok(Summary::Deployed(Box::new(DeploySummary {
            service: service.name.clone(),
            endpoint: destination.endpoint.clone(),
            artifact,
            binary_path: installed.remote_path,
            unit_path: registered.unit_path,
            stop,
            config,
        })))
    }

    /// Save the local deploy record. Everything on the device is done by
    /// now, so a failure here only warns.
    fn record_state(&self, endpoint: &Endpoint, state: &DeployState) {
        self.reporter.started(Stage::RecordState);
        let path = DeployState::path_for(&self.project_root, endpoint.host());
        match state.save(&path) {
            Ok(()) => {
                tracing::debug!("Saved deploy state to {}", path);
                self.reporter.finished(Stage::RecordState);
            }
            Err(e) => self.reporter.tolerated(Stage::RecordState, &e),
        }
    }

    fn stage<T>(
        &self,
        stage: Stage,
        f: impl FnOnce() -> crate::Result<T>,
    ) -> std::result::Result<T, PipelineError> {
        self.reporter.started(stage);
        match f() {
            Ok(value) => {
                self.reporter.finished(stage);
                Ok(value)
            }
            Err(cause) => {
                self.reporter.failed(stage, &cause);
                Err(PipelineError { stage, cause })
            }
        }
    }
}
