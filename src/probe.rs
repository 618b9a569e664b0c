//! Mount readiness detection
//!
//! The mount helper daemonizes, so a successful spawn says nothing about
//! whether the filesystem is live. Readiness is decided by polling the
//! mountpoint until it reports the filesystem root inode and accepts a write.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{DriverError, Result};

/// Inode number reported by the root of a JuiceFS mount
pub const ROOT_INODE: u64 = 1;

/// File touched inside the mountpoint to confirm it is writable
pub const SENTINEL_FILE: &str = ".juicefs";

pub const DEFAULT_ATTEMPTS: u32 = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Filesystem access used by the probe
pub trait MountInspector: Send + Sync {
    /// Inode of `path`, without following symlinks
    fn inode(&self, path: &Path) -> io::Result<u64>;

    /// Create (or touch) the sentinel file inside `mountpoint`
    fn touch_sentinel(&self, mountpoint: &Path) -> io::Result<()>;
}

/// Inspector backed by the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsInspector;

impl MountInspector for FsInspector {
    fn inode(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::symlink_metadata(path)?.ino())
    }

    fn touch_sentinel(&self, mountpoint: &Path) -> io::Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(mountpoint.join(SENTINEL_FILE))
            .map(|_| ())
    }
}

/// Check whether `path` is currently a mounted filesystem root.
///
/// Diagnostic only: nothing is written to the path.
pub fn is_mounted_root(path: &Path) -> bool {
    is_mounted_root_with(&FsInspector, path)
}

fn is_mounted_root_with(inspector: &dyn MountInspector, path: &Path) -> bool {
    matches!(inspector.inode(path), Ok(ROOT_INODE))
}

/// Bounded polling loop confirming a mountpoint went live
#[derive(Clone)]
pub struct ReadinessProbe {
    attempts: u32,
    interval: Duration,
    inspector: Arc<dyn MountInspector>,
}

impl ReadinessProbe {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self::with_inspector(attempts, interval, Arc::new(FsInspector))
    }

    pub fn with_inspector(
        attempts: u32,
        interval: Duration,
        inspector: Arc<dyn MountInspector>,
    ) -> Self {
        Self {
            attempts,
            interval,
            inspector,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Same check as [`is_mounted_root`], through this probe's inspector
    pub fn is_mounted_root(&self, path: &Path) -> bool {
        is_mounted_root_with(self.inspector.as_ref(), path)
    }

    /// Poll `mountpoint` until it is a live filesystem root.
    ///
    /// Sleeps `interval` after every failed attempt. Returns
    /// [`DriverError::ReadinessTimeout`] with the last cause once all
    /// attempts are used.
    pub async fn wait_ready(&self, mountpoint: &Path) -> Result<()> {
        let mut last_cause = format!("mountpoint {} did not become ready", mountpoint.display());

        for attempt in 1..=self.attempts {
            // stat and open can hang on a stuck FUSE endpoint
            let inspector = self.inspector.clone();
            let path = mountpoint.to_path_buf();
            let outcome =
                tokio::task::spawn_blocking(move || check_ready(inspector.as_ref(), &path))
                    .await
                    .unwrap_or_else(|e| Err(format!("readiness check failed: {}", e)));

            match outcome {
                Ok(()) => {
                    debug!("Mountpoint {:?} ready after {} attempt(s)", mountpoint, attempt);
                    return Ok(());
                }
                Err(cause) => last_cause = cause,
            }

            debug!(
                "Attempt {} waiting for {:?} failed: {}",
                attempt, mountpoint, last_cause
            );
            tokio::time::sleep(self.interval).await;
        }

        Err(DriverError::ReadinessTimeout {
            mountpoint: mountpoint.display().to_string(),
            attempts: self.attempts,
            cause: last_cause,
        })
    }
}

/// One readiness attempt: root inode, then a sentinel write
fn check_ready(
    inspector: &dyn MountInspector,
    mountpoint: &Path,
) -> std::result::Result<(), String> {
    match inspector.inode(mountpoint) {
        Ok(ROOT_INODE) => inspector.touch_sentinel(mountpoint).map_err(|e| e.to_string()),
        Ok(ino) => Err(format!(
            "mountpoint {} not yet a JuiceFS mount (ino={})",
            mountpoint.display(),
            ino
        )),
        Err(e) => Err(e.to_string()),
    }
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_INTERVAL)
    }
}
