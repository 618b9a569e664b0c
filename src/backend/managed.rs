//! Managed/Enterprise flow: `juicefs auth` then a detached `juicefs mount`
//!
//! Storage credentials travel as environment variables only. The token is
//! the one secret that still reaches the mount command line, and it is masked
//! wherever the command or its output is logged.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{cli_command, helper_env, Backend};
use crate::error::{DriverError, Result};
use crate::options::{BackendMode, ManagedPlan};
use crate::process::{run_captured, spawn_detached, DetachedOutput};
use crate::volume::Volume;

/// Whether CLI output says `auth` or `--token` is not supported, as printed
/// by older CLI releases
pub fn is_auth_unsupported(output: &str) -> bool {
    let out = output.to_lowercase();
    out.contains("no help topic for 'auth'")
        || (out.contains("unknown") && out.contains("auth"))
        || out.contains("unknown option: --token")
        || out.contains("unknown flag: --token")
        || out.contains("flag provided but not defined: --token")
}

/// Drives the token-based CLI
#[derive(Debug, Clone)]
pub struct ManagedBackend {
    cli: PathBuf,
    mount_helper: PathBuf,
}

impl ManagedBackend {
    pub fn new(cli: impl Into<PathBuf>, mount_helper: impl Into<PathBuf>) -> Self {
        Self {
            cli: cli.into(),
            mount_helper: mount_helper.into(),
        }
    }

    async fn authenticate(&self, volume: &Volume, plan: &ManagedPlan) -> Result<()> {
        let mut auth = cli_command(&self.cli, &plan.env);
        auth.arg("auth").arg(&volume.name);
        if let Some(token) = &plan.token {
            auth.arg(format!("--token={}", token));
        }

        match run_captured(auth, "auth", &plan.secrets).await {
            Ok(_) => Ok(()),
            Err(DriverError::Subprocess { ref output, .. }) if is_auth_unsupported(output) => {
                warn!(
                    "juicefs auth not supported by {:?}, continuing to mount {}: {}",
                    self.cli, volume.name, output
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Backend for ManagedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Managed
    }

    async fn launch(&self, volume: &Volume) -> Result<()> {
        let plan = ManagedPlan::from_options(&volume.options);
        if !plan.env.is_empty() {
            debug!(
                "Extra env for volume {}: {:?}",
                volume.name,
                plan.env.iter().map(|(k, _)| k).collect::<Vec<_>>()
            );
        }

        self.authenticate(volume, &plan).await?;

        let mut env = plan.env.clone();
        env.extend(
            helper_env(&self.mount_helper)
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let mut mount = cli_command(&self.cli, &env);
        mount
            .arg("mount")
            .arg(&volume.name)
            .arg(&volume.mountpoint)
            .arg("-d")
            .args(&plan.mount_args);
        spawn_detached(
            mount,
            format!("juicefs mount for volume {}", volume.name),
            plan.secrets,
            DetachedOutput::Capture,
        )?;

        info!("Started juicefs mount for {} at {:?}", volume.name, volume.mountpoint);
        Ok(())
    }
}
