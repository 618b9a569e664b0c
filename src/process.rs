//! Subprocess execution for the juicefs and umount CLIs

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{DriverError, Result};
use crate::redact::SecretRedactor;

/// Render a command line for logging, with secrets masked
pub fn describe(cmd: &Command, redactor: &SecretRedactor) -> String {
    let std_cmd = cmd.as_std();
    let mut line = std_cmd.get_program().to_string_lossy().into_owned();
    for arg in std_cmd.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    redactor.redact(&line)
}

fn program_of(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

/// Run a command to completion and return its combined output.
///
/// A non-zero exit becomes [`DriverError::Subprocess`] carrying the trimmed,
/// redacted output.
pub async fn run_captured(
    mut cmd: Command,
    action: &str,
    redactor: &SecretRedactor,
) -> Result<String> {
    debug!("Running {}", describe(&cmd, redactor));
    let program = program_of(&cmd);

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| DriverError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(DriverError::Subprocess {
            program,
            action: action.to_string(),
            code: output.status.code(),
            output: redactor.redact(combined.trim()),
        });
    }

    Ok(combined)
}

/// What happens to a detached process's stdout and stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachedOutput {
    /// Pipe both and include them in the failure log. The observer then
    /// lives as long as anything, including a daemonized child, holds the
    /// pipes open.
    Capture,
    /// Send both to /dev/null; the observer only reaps the process
    Discard,
}

/// Start a command that is expected to daemonize, without waiting for it.
///
/// A background task owns the child. Its only effect is a log line when the
/// process exits unsuccessfully; the returned handle may be dropped.
pub fn spawn_detached(
    mut cmd: Command,
    label: String,
    redactor: SecretRedactor,
    output: DetachedOutput,
) -> Result<JoinHandle<()>> {
    debug!("Starting {}", describe(&cmd, &redactor));
    let program = program_of(&cmd);

    cmd.stdin(Stdio::null());
    match output {
        DetachedOutput::Capture => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
        DetachedOutput::Discard => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
    };

    let child = cmd
        .spawn()
        .map_err(|source| DriverError::Spawn { program, source })?;

    Ok(tokio::spawn(observe(child, label, redactor)))
}

async fn observe(mut child: Child, label: String, redactor: SecretRedactor) {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let mut out = Vec::new();
    let mut err = Vec::new();
    let read_out = async {
        if let Some(pipe) = stdout.as_mut() {
            let _ = pipe.read_to_end(&mut out).await;
        }
    };
    let read_err = async {
        if let Some(pipe) = stderr.as_mut() {
            let _ = pipe.read_to_end(&mut err).await;
        }
    };
    tokio::join!(read_out, read_err);

    let mut combined = String::from_utf8_lossy(&out).into_owned();
    combined.push_str(&String::from_utf8_lossy(&err));
    let combined = redactor.redact(combined.trim());

    match child.wait().await {
        Ok(status) if status.success() => {
            debug!("{} exited cleanly", label);
        }
        Ok(status) => {
            warn!(
                "{} exited with {} (may be benign if daemonized): {}",
                label, status, combined
            );
        }
        Err(e) if e.raw_os_error() == Some(libc::ECHILD) => {
            debug!("{} was reaped elsewhere after daemonizing", label);
        }
        Err(e) => {
            warn!("Failed to wait for {}: {}", label, e);
        }
    }
}
