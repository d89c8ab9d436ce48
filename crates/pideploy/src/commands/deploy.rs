//! Deploy command implementation

use camino::Utf8Path;
use clap::Args;
use miette::Result;
use pideploy_core::build::CargoToolchain;
use pideploy_core::config::Config;
use pideploy_core::pipeline::{Pipeline, Summary};
use pideploy_core::remote::SshTransport;
use pideploy_core::request;

use crate::progress::ConsoleReporter;

/// Arguments for a deploy run
#[derive(Debug, Clone, Default, Args)]
pub struct DeployArgs {
    /// Remote host or IP address, optionally with :port (required unless --build-only)
    #[arg(short = 'h', long)]
    pub host: Option<String>,

    /// Remote user [default: local user]
    #[arg(short, long)]
    pub user: Option<String>,

    /// Target architecture (armv6, aarch64) [default: build.default_target]
    #[arg(short, long)]
    pub target: Option<String>,

    /// Build in release mode
    #[arg(short, long)]
    pub release: bool,

    /// Build every target and skip deployment
    #[arg(short, long)]
    pub build_only: bool,

    /// Remote install directory [default: /home/<user>/<service>]
    #[arg(long)]
    pub remote_dir: Option<String>,

    /// Dry run - show what would be built and deployed
    #[arg(long)]
    pub dry_run: bool,
}

impl From<DeployArgs> for request::DeployArgs {
    fn from(args: DeployArgs) -> Self {
        Self {
            host: args.host,
            user: args.user,
            target: args.target,
            remote_dir: args.remote_dir,
            release: args.release,
            build_only: args.build_only,
            dry_run: args.dry_run,
        }
    }
}

/// Run the deploy command
pub fn run(project_root: &Utf8Path, args: DeployArgs) -> Result<()> {
    tracing::debug!("Loading configuration from {}", project_root);
    let config = Config::load(project_root)?;

    let toolchain = CargoToolchain::new(project_root, &config.service.name);
    let transport = SshTransport::new(config.remote.connect_timeout());
    let reporter = ConsoleReporter::new();
    let pipeline = Pipeline::new(&toolchain, &transport, &reporter, project_root);

    let summary = pipeline.execute(&args.into(), &config)?;
    println!("{}", summary);

    if let Summary::BuildOnly(report) = &summary {
        if report.has_failures() {
            let failed: Vec<_> = report.failures().map(|(target, _)| target.id).collect();
            return Err(miette::miette!(
                help = "See the build output above for the failing targets",
                "Build failed for {}",
                failed.join(", ")
            ));
        }
    }

    Ok(())
}
