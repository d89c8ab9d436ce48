//! Connectivity probe

use std::time::Duration;

use super::{Endpoint, RemoteOp, RemoteSession, Transport};
use crate::{Error, Result};

/// Confirm that `endpoint` answers a non-interactive round trip within
/// `timeout`.
///
/// This is the only way to obtain a [`RemoteSession`]; nothing that changes
/// the device can run before it succeeds.
pub fn probe<'a>(
    transport: &'a dyn Transport,
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<RemoteSession<'a>> {
    tracing::info!(
        "Checking connectivity to {} ({}s timeout)",
        endpoint,
        timeout.as_secs()
    );

    let output = transport
        .execute(endpoint, &RemoteOp::TestReachability { timeout })
        .map_err(|e| Error::unreachable(endpoint.destination(), format!("could not run ssh: {e}")))?;

    if !output.success() {
        return Err(Error::unreachable(
            endpoint.destination(),
            output.failure_reason(),
        ));
    }

    tracing::info!("{} is reachable", endpoint);
    Ok(RemoteSession::new(transport, endpoint.clone()))
}
