//! pideploy CLI - build and deploy the door-monitor service

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};
use miette::Result;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pideploy::commands;

/// pideploy - cross-compile the door-monitor service and deploy it to a Raspberry Pi
#[derive(Debug, Parser)]
#[command(name = "pideploy")]
#[command(version, about, long_about = None)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Project root (Cargo workspace and pideploy.toml) [default: current directory]
    #[arg(short, long)]
    project: Option<Utf8PathBuf>,

    #[command(flatten)]
    deploy: commands::deploy::DeployArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with indicatif layer for progress bar support
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .with(filter)
        .init();

    let project_root = if let Some(path) = cli.project {
        path
    } else {
        std::env::current_dir()
            .ok()
            .and_then(|p| Utf8PathBuf::try_from(p).ok())
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    };

    commands::deploy::run(&project_root, cli.deploy)
}
