//! Community Edition flow: `juicefs format` then a detached `juicefs mount`
//!
//! Selected when the volume source is a metadata-service URL. Formatting an
//! already formatted volume is a no-op for the CLI, so it runs on every mount.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{cli_command, helper_env, Backend};
use crate::error::Result;
use crate::options::{BackendMode, CommunityPlan};
use crate::process::{run_captured, spawn_detached, DetachedOutput};
use crate::volume::Volume;

/// Drives the metaurl-based CLI
#[derive(Debug, Clone)]
pub struct CommunityBackend {
    cli: PathBuf,
    mount_helper: PathBuf,
}

impl CommunityBackend {
    pub fn new(cli: impl Into<PathBuf>, mount_helper: impl Into<PathBuf>) -> Self {
        Self {
            cli: cli.into(),
            mount_helper: mount_helper.into(),
        }
    }
}

#[async_trait]
impl Backend for CommunityBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Community
    }

    async fn launch(&self, volume: &Volume) -> Result<()> {
        let plan = CommunityPlan::from_options(&volume.options);
        if !plan.env.is_empty() {
            debug!(
                "Extra env for volume {}: {:?}",
                volume.name,
                plan.env.iter().map(|(k, _)| k).collect::<Vec<_>>()
            );
        }

        // format is idempotent for an existing volume with the same settings
        let mut format = cli_command(&self.cli, &plan.env);
        format
            .arg("format")
            .arg("--no-update")
            .args(&plan.format_args)
            .arg(&volume.source)
            .arg(&volume.name);
        run_captured(format, "format", &plan.secrets).await?;

        let mut env = plan.env.clone();
        env.extend(
            helper_env(&self.mount_helper)
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let mut mount = cli_command(&self.cli, &env);
        mount
            .arg("mount")
            .arg("-d")
            .args(&plan.mount_args)
            .arg(&volume.source)
            .arg(&volume.mountpoint);
        spawn_detached(
            mount,
            format!("juicefs mount for volume {}", volume.name),
            plan.secrets,
            DetachedOutput::Discard,
        )?;

        info!("Started juicefs mount for {} at {:?}", volume.name, volume.mountpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::testutil::{fail_subcommand, recorded_env, recording_cli, wait_for_calls};
    use std::collections::HashMap;

    fn volume(dir: &std::path::Path, options: &[(&str, &str)]) -> Volume {
        Volume {
            name: "jfs".to_string(),
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            source: "redis://meta:6379/1".to_string(),
            mountpoint: dir.join("mnt"),
            connections: 0,
        }
    }

    #[tokio::test]
    async fn test_format_then_detached_mount() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = recording_cli(tmp.path(), "juicefs");
        let backend = CommunityBackend::new(&cli, tmp.path().join("no-helper"));

        let v = volume(
            tmp.path(),
            &[
                ("block-size", "4096"),
                ("writeback", ""),
                ("env", "META_PASSWORD=pw"),
            ],
        );
        backend.launch(&v).await.unwrap();

        let calls = wait_for_calls(tmp.path(), 2).await;
        assert_eq!(
            calls[0],
            "format --no-update --block-size=4096 redis://meta:6379/1 jfs"
        );
        assert_eq!(
            calls[1],
            format!(
                "mount -d --writeback redis://meta:6379/1 {}",
                v.mountpoint.display()
            )
        );

        let format_env = recorded_env(tmp.path(), "format");
        assert!(format_env.contains("META_PASSWORD=pw"));

        let mount_env = recorded_env(tmp.path(), "mount");
        assert!(mount_env.contains("META_PASSWORD=pw"));
        assert!(mount_env.contains("JFS_NO_UPDATE=1"));
        assert!(!mount_env.contains("JFS_MOUNT_BIN="));
    }

    #[tokio::test]
    async fn test_format_failure_aborts_mount() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = recording_cli(tmp.path(), "juicefs");
        fail_subcommand(tmp.path(), "format", "bad secret SK9");
        let backend = CommunityBackend::new(&cli, tmp.path().join("no-helper"));

        let v = volume(tmp.path(), &[("secret-key", "SK9")]);
        let err = backend.launch(&v).await.unwrap_err();

        match err {
            DriverError::Subprocess { action, output, .. } => {
                assert_eq!(action, "format");
                assert_eq!(output, "bad secret ****");
            }
            other => panic!("expected subprocess error, got {:?}", other),
        }

        let calls = wait_for_calls(tmp.path(), 1).await;
        assert_eq!(calls.len(), 1);
    }
}
