//! Command execution with log capture
//!
//! Build tools can be noisy and slow; their output is streamed line by line
//! into tracing instead of being buffered until exit.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::{Error, Result};

/// Build tools do not promise UTF-8 output, so lines are decoded lossily
/// and never end the stream.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Run a command, logging each stdout/stderr line under the `build_output`
/// target.
///
/// * `target_id` - target being built (for log fields and error messages)
/// * `operation` - description of the operation (e.g., "cross build")
pub async fn run_command_with_logging(
    command: &mut Command,
    target_id: &str,
    operation: &str,
) -> Result<()> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());

    tracing::debug!("Running command: {:?}", command);

    let mut child = command.spawn().map_err(|e| {
        Error::toolchain(
            format!("{} failed to start for {}: {}", operation, target_id, e),
            "Install the Rust toolchain with rustup, and `cargo install cross` for release builds",
        )
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let target_stdout = target_id.to_string();
    let stdout_task = async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).split(b'\n');
            while let Ok(Some(line)) = lines.next_segment().await {
                tracing::debug!(target: "build_output", arch = %target_stdout, "{}", decode_line(&line));
            }
        }
    };

    // cargo reports progress on stderr, so it is logged at info level
    let target_stderr = target_id.to_string();
    let stderr_task = async move {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).split(b'\n');
            while let Ok(Some(line)) = lines.next_segment().await {
                tracing::info!(target: "build_output", arch = %target_stderr, "{}", decode_line(&line));
            }
        }
    };

    let (status, (), ()) = tokio::join!(child.wait(), stdout_task, stderr_task);
    let status = status.map_err(|e| {
        Error::toolchain(
            format!("{} failed for {}: {}", operation, target_id, e),
            "Check the build output for errors",
        )
    })?;

    if !status.success() {
        return Err(Error::toolchain(
            format!(
                "{} failed for {} with exit code {:?}",
                operation,
                target_id,
                status.code()
            ),
            "Check the build output above for compiler errors",
        ));
    }

    Ok(())
}
