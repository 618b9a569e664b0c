//! Mount orchestration and lifecycle
//!
//! A mount attempt moves through these phases:
//!
//! ```text
//! EnsuringMountpoint -> Launching(community | managed) -> Probing -> Ready | Failed
//! ```
//!
//! Only `Ready` returns success. The launched helper daemonizes, so its exit
//! status never decides the outcome; the readiness probe does.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use crate::backend::{Backend, CommunityBackend, ManagedBackend};
use crate::config::CliConfig;
use crate::error::{DriverError, Result};
use crate::options::{collect_secrets, BackendMode};
use crate::probe::ReadinessProbe;
use crate::process::run_captured;
use crate::volume::Volume;

/// Phase of a single mount attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPhase {
    EnsuringMountpoint,
    Launching(BackendMode),
    Probing,
    Ready,
    Failed,
}

impl fmt::Display for MountPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountPhase::EnsuringMountpoint => write!(f, "ensuring mountpoint"),
            MountPhase::Launching(BackendMode::Community) => write!(f, "launching community mount"),
            MountPhase::Launching(BackendMode::Managed) => write!(f, "launching managed mount"),
            MountPhase::Probing => write!(f, "probing"),
            MountPhase::Ready => write!(f, "ready"),
            MountPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Make sure `path` is a directory, creating it (and parents) if missing
pub fn ensure_mountpoint(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(DriverError::InvalidMountpoint(path.display().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Creating mountpoint {:?}", path);
            std::fs::create_dir_all(path)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Brings volumes' mountpoints live and tears them down
pub struct MountOrchestrator {
    community: Arc<dyn Backend>,
    managed: Arc<dyn Backend>,
    probe: ReadinessProbe,
    unmount_cli: std::path::PathBuf,
}

impl MountOrchestrator {
    /// Orchestrator driving the real CLIs
    pub fn new(cli: &CliConfig, probe: ReadinessProbe) -> Self {
        Self::with_backends(
            Arc::new(CommunityBackend::new(&cli.community_cli, &cli.mount_helper)),
            Arc::new(ManagedBackend::new(&cli.managed_cli, &cli.mount_helper)),
            probe,
            &cli.unmount_cli,
        )
    }

    pub fn with_backends(
        community: Arc<dyn Backend>,
        managed: Arc<dyn Backend>,
        probe: ReadinessProbe,
        unmount_cli: &Path,
    ) -> Self {
        Self {
            community,
            managed,
            probe,
            unmount_cli: unmount_cli.to_path_buf(),
        }
    }

    pub fn probe(&self) -> &ReadinessProbe {
        &self.probe
    }

    /// Backend serving a source kind
    pub fn backend_for(&self, mode: BackendMode) -> &Arc<dyn Backend> {
        match mode {
            BackendMode::Community => &self.community,
            BackendMode::Managed => &self.managed,
        }
    }

    /// Mount a volume; returns once the mountpoint is a live filesystem root
    pub async fn mount(&self, volume: &Volume) -> Result<()> {
        info!("Mounting {} at {:?}", volume.name, volume.mountpoint);

        let result = self.run_phases(volume).await;
        match &result {
            Ok(()) => debug!("Mount of {}: {}", volume.name, MountPhase::Ready),
            Err(e) => debug!("Mount of {}: {} ({})", volume.name, MountPhase::Failed, e),
        }
        result
    }

    async fn run_phases(&self, volume: &Volume) -> Result<()> {
        debug!("Mount of {}: {}", volume.name, MountPhase::EnsuringMountpoint);
        ensure_mountpoint(&volume.mountpoint)?;

        let mode = volume.mode();
        debug!("Mount of {}: {}", volume.name, MountPhase::Launching(mode));
        self.backend_for(mode).launch(volume).await?;

        debug!("Mount of {}: {}", volume.name, MountPhase::Probing);
        self.probe.wait_ready(&volume.mountpoint).await
    }

    /// Unmount a volume's mountpoint
    pub async fn unmount(&self, volume: &Volume) -> Result<()> {
        info!("Unmounting {:?}", volume.mountpoint);

        let mut cmd = Command::new(&self.unmount_cli);
        cmd.arg(&volume.mountpoint);
        run_captured(cmd, "umount", &collect_secrets(&volume.options)).await?;
        Ok(())
    }
}
