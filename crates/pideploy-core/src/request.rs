//! Deploy request resolution
//!
//! Command line input, project configuration and defaults are combined once
//! into an immutable [`DeployRequest`]. Every precondition is checked here,
//! before the toolchain or the network is touched.

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{Config, RemoteConfig, ServiceConfig};
use crate::remote::Endpoint;
use crate::target::{BuildMode, TargetSpec};
use crate::{Error, Result};

/// Raw deploy options as given on the command line
#[derive(Debug, Clone, Default)]
pub struct DeployArgs {
    /// Remote host, optionally with `:port`
    pub host: Option<String>,
    /// Remote user
    pub user: Option<String>,
    /// Architecture identifier
    pub target: Option<String>,
    /// Remote directory the service is installed into
    pub remote_dir: Option<String>,
    /// Build in release mode
    pub release: bool,
    /// Build every target and skip deployment
    pub build_only: bool,
    /// Show the plan without building or touching the device
    pub dry_run: bool,
}

/// Where the service gets installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub endpoint: Endpoint,
    pub remote_dir: Utf8PathBuf,
}

impl Destination {
    /// Remote path of the service binary
    pub fn binary_path(&self, service: &ServiceConfig) -> Utf8PathBuf {
        self.remote_dir.join(&service.name)
    }

    /// Remote path of the service configuration document
    pub fn config_path(&self, service: &ServiceConfig) -> Utf8PathBuf {
        self.remote_dir.join(&service.config_file)
    }
}

/// Validated configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct DeployRequest {
    target: &'static TargetSpec,
    mode: BuildMode,
    destination: Option<Destination>,
    service: ServiceConfig,
    remote: RemoteConfig,
    build_only: bool,
    dry_run: bool,
}

impl DeployRequest {
    pub fn target(&self) -> &'static TargetSpec {
        self.target
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Install destination; `None` only for build-only requests
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    pub fn build_only(&self) -> bool {
        self.build_only
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Resolve a request using the local login name as the default remote user
pub fn resolve(args: &DeployArgs, config: &Config) -> Result<DeployRequest> {
    resolve_with_local_user(args, config, local_user().as_deref())
}

/// Resolve a request with an explicit local user
pub fn resolve_with_local_user(
    args: &DeployArgs,
    config: &Config,
    local_user: Option<&str>,
) -> Result<DeployRequest> {
    let target_id = args
        .target
        .as_deref()
        .unwrap_or(&config.build.default_target);
    let target = TargetSpec::find(target_id)?;

    let destination = if args.build_only {
        None
    } else {
        Some(resolve_destination(args, config, local_user)?)
    };

    let request = DeployRequest {
        target,
        mode: BuildMode::from_release_flag(args.release),
        destination,
        service: config.service.clone(),
        remote: config.remote.clone(),
        build_only: args.build_only,
        dry_run: args.dry_run,
    };

    tracing::debug!(?request, "Resolved deploy request");
    Ok(request)
}

fn resolve_destination(
    args: &DeployArgs,
    config: &Config,
    local_user: Option<&str>,
) -> Result<Destination> {
    let host = args.host.as_deref().ok_or(Error::MissingHost)?;

    let user = match args.user.as_deref().or(local_user) {
        Some(user) if !user.trim().is_empty() => user.trim(),
        Some(_) => {
            return Err(Error::validation(
                "Remote user is empty",
                "Pass a user name with --user",
            ));
        }
        None => {
            return Err(Error::validation(
                "Unable to determine the local user name",
                "Pass the remote user explicitly with --user",
            ));
        }
    };

    let endpoint = Endpoint::parse(user, host)?;

    let remote_dir = match args.remote_dir.as_deref() {
        Some(dir) => {
            let dir = Utf8Path::new(dir.trim_end_matches('/'));
            if !dir.is_absolute() {
                return Err(Error::validation(
                    format!("Remote directory '{}' is not absolute", dir),
                    "Use an absolute path such as /home/pi/door-monitor",
                ));
            }
            dir.to_path_buf()
        }
        None => default_remote_dir(endpoint.user(), &config.service.name),
    };

    Ok(Destination {
        endpoint,
        remote_dir,
    })
}

/// `/home/<user>/<service-name>`
pub fn default_remote_dir(user: &str, service_name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from("/home").join(user).join(service_name)
}

/// Login name of the operator running pideploy
pub fn local_user() -> Option<String> {
    ["USER", "LOGNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
}
