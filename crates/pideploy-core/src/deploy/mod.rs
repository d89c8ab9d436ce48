//! Device-side deploy stages
//!
//! Every function here takes a [`RemoteSession`](crate::remote::RemoteSession),
//! so none of them can run before the connectivity probe succeeded.

mod bootstrap;
mod installer;
mod state;
mod unit;

pub use bootstrap::{BootstrapOutcome, ConfigDocument, SmsSettings, bootstrap_config};
pub use installer::{Installed, install};
pub use state::{DeployState, STATE_DIR};
pub use unit::{Registered, ServiceUnitDescriptor, synthesize};
