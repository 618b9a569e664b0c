//! Shared helpers for integration tests
#![allow(dead_code)]

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jfs_volume_driver::backend::{CommunityBackend, ManagedBackend};
use jfs_volume_driver::driver::Driver;
use jfs_volume_driver::mount::MountOrchestrator;
use jfs_volume_driver::probe::{MountInspector, ReadinessProbe, ROOT_INODE};
use jfs_volume_driver::registry::VolumeRegistry;

/// Stand-in for both juicefs CLIs: logs argv to `calls.log`, the environment
/// to `env.<subcommand>`
const FAKE_JUICEFS: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
env > "$dir/env.$1"
echo "$*" >> "$dir/calls.log"
exit 0
"#;

/// Stand-in for umount: logs its argument to `umount.log`
const FAKE_UMOUNT: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$*" >> "$dir/umount.log"
exit 0
"#;

/// Reports every path as a filesystem root
pub struct AlwaysMounted;

impl MountInspector for AlwaysMounted {
    fn inode(&self, _path: &Path) -> io::Result<u64> {
        Ok(ROOT_INODE)
    }

    fn touch_sentinel(&self, _mountpoint: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// A driver rooted in a temp dir with fake CLIs in `<tmp>/bin`
pub struct TestDriver {
    pub tmp: tempfile::TempDir,
    pub driver: Arc<Driver>,
}

impl TestDriver {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let driver = Arc::new(build_driver(tmp.path()));
        Self { tmp, driver }
    }

    pub fn root(&self) -> PathBuf {
        self.tmp.path().join("root")
    }

    pub fn bin(&self) -> PathBuf {
        self.tmp.path().join("bin")
    }

    /// Reopen the registry from the state file, as after a restart
    pub fn restart(&self) -> Driver {
        build_driver(self.tmp.path())
    }

    /// Wait until the fake CLI has been called `n` times
    pub async fn calls(&self, n: usize) -> Vec<String> {
        let log = self.bin().join("calls.log");
        for _ in 0..100 {
            if let Ok(content) = std::fs::read_to_string(&log) {
                let lines: Vec<String> = content.lines().map(str::to_string).collect();
                if lines.len() >= n {
                    return lines;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("timed out waiting for {} call(s)", n);
    }

    pub fn recorded_env(&self, subcommand: &str) -> String {
        std::fs::read_to_string(self.bin().join(format!("env.{}", subcommand))).unwrap_or_default()
    }

    pub fn umounts(&self) -> Vec<String> {
        std::fs::read_to_string(self.bin().join("umount.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn build_driver(dir: &Path) -> Driver {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let juicefs = write_executable(&bin.join("juicefs"), FAKE_JUICEFS);
    let umount = write_executable(&bin.join("umount"), FAKE_UMOUNT);

    let probe = ReadinessProbe::with_inspector(2, Duration::from_millis(10), Arc::new(AlwaysMounted));
    let orchestrator = MountOrchestrator::with_backends(
        Arc::new(CommunityBackend::new(&juicefs, bin.join("jfsmount"))),
        Arc::new(ManagedBackend::new(&juicefs, bin.join("jfsmount"))),
        probe,
        &umount,
    );
    let registry = VolumeRegistry::open(&dir.join("root")).unwrap();
    Driver::new(registry, orchestrator)
}

fn write_executable(path: &Path, content: &str) -> PathBuf {
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Options map from pairs
pub fn opts(pairs: &[(&str, &str)]) -> std::collections::HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
