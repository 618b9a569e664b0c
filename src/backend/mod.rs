pub mod community;
pub mod managed;

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::env::{MountEnv, MOUNT_BIN_VAR, NO_UPDATE_VAR};
use crate::error::Result;
use crate::options::BackendMode;
use crate::volume::Volume;

pub use community::CommunityBackend;
pub use managed::ManagedBackend;

/// One juicefs CLI flow.
///
/// `launch` runs everything up to and including starting the detached mount
/// helper. It must not wait for the filesystem to come up; readiness is
/// decided by the caller.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which source kind this backend serves
    fn mode(&self) -> BackendMode;

    /// Prepare the volume and start the mount helper
    async fn launch(&self, volume: &Volume) -> Result<()>;
}

/// Environment shared by every mount subprocess: self-update disabled and,
/// when the bundled helper exists, its path pinned.
pub fn helper_env(mount_helper: &Path) -> MountEnv {
    let mut env = MountEnv::new();
    env.set(NO_UPDATE_VAR, "1");
    if mount_helper.exists() {
        env.set(MOUNT_BIN_VAR, mount_helper.to_string_lossy().into_owned());
    }
    env
}

/// Build a CLI command with `env` layered over the inherited environment
fn cli_command(program: &Path, env: &MountEnv) -> Command {
    let mut cmd = Command::new(program);
    env.apply(&mut cmd);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_env_without_bundled_helper() {
        let env = helper_env(Path::new("/nonexistent/jfsmount"));
        assert_eq!(env.get(NO_UPDATE_VAR), Some("1"));
        assert_eq!(env.get(MOUNT_BIN_VAR), None);
    }

    #[test]
    fn test_helper_env_pins_bundled_helper() {
        let tmp = tempfile::tempdir().unwrap();
        let helper = tmp.path().join("jfsmount");
        std::fs::write(&helper, b"").unwrap();

        let env = helper_env(&helper);
        assert_eq!(env.get(MOUNT_BIN_VAR), Some(helper.to_str().unwrap()));
    }
}
