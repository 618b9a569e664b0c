//! Volume driver facade
//!
//! The lifecycle operations called by the plugin transport. Registry calls
//! run under the registry lock; mount and unmount only hold the volume's own
//! lock while the CLI runs.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::Result;
use crate::mount::MountOrchestrator;
use crate::probe::ReadinessProbe;
use crate::registry::VolumeRegistry;

/// Volume summary returned by `get` and `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Mountpoint")]
    pub mountpoint: PathBuf,
}

/// Driver capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    #[serde(rename = "Scope")]
    pub scope: &'static str,
}

/// Log a failed operation at error level and pass the result through
fn logged<T>(method: &str, name: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!("{} {}: {}", method, name, e);
    }
    result
}

pub struct Driver {
    registry: VolumeRegistry,
    orchestrator: MountOrchestrator,
}

impl Driver {
    pub fn new(registry: VolumeRegistry, orchestrator: MountOrchestrator) -> Self {
        Self {
            registry,
            orchestrator,
        }
    }

    /// Open the registry under `config.root` and wire up the real CLIs
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = VolumeRegistry::open(&config.root)?;
        let probe = ReadinessProbe::new(config.readiness.attempts, config.readiness.interval);
        let orchestrator = MountOrchestrator::new(&config.cli, probe);
        Ok(Self::new(registry, orchestrator))
    }

    pub fn registry(&self) -> &VolumeRegistry {
        &self.registry
    }

    pub fn create(&self, name: &str, options: &HashMap<String, String>) -> Result<()> {
        debug!("create: {} ({} option(s))", name, options.len());
        logged("create", name, self.registry.create(name, options).map(|_| ()))
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        debug!("remove: {}", name);
        logged("remove", name, self.registry.remove(name))
    }

    pub fn path(&self, name: &str) -> Result<PathBuf> {
        debug!("path: {}", name);
        logged("path", name, self.registry.path(name))
    }

    pub fn get(&self, name: &str) -> Result<VolumeInfo> {
        debug!("get: {}", name);
        let result = self.registry.get(name).map(|v| VolumeInfo {
            name: name.to_string(),
            mountpoint: v.mountpoint,
        });
        logged("get", name, result)
    }

    pub fn list(&self) -> Vec<VolumeInfo> {
        debug!("list");
        self.registry
            .list()
            .into_iter()
            .map(|(name, v)| VolumeInfo {
                name,
                mountpoint: v.mountpoint,
            })
            .collect()
    }

    /// Mount a volume and count the new connection
    pub async fn mount(&self, name: &str) -> Result<PathBuf> {
        debug!("mount: {}", name);
        logged("mount", name, self.mount_inner(name).await)
    }

    async fn mount_inner(&self, name: &str) -> Result<PathBuf> {
        let handle = self.registry.lock_volume(name).await?;

        self.orchestrator.mount(handle.volume()).await?;

        let connections = handle.connect();
        debug!("Volume {} now has {} connection(s)", name, connections);
        self.registry.persist();
        Ok(handle.mountpoint().to_path_buf())
    }

    /// Unmount a volume and drop one connection
    pub async fn unmount(&self, name: &str) -> Result<()> {
        debug!("unmount: {}", name);
        logged("unmount", name, self.unmount_inner(name).await)
    }

    async fn unmount_inner(&self, name: &str) -> Result<()> {
        let handle = self.registry.lock_volume(name).await?;

        self.orchestrator.unmount(handle.volume()).await?;

        let connections = handle.disconnect();
        debug!("Volume {} now has {} connection(s)", name, connections);
        self.registry.persist();
        Ok(())
    }

    pub fn capabilities(&self) -> Capabilities {
        debug!("capabilities");
        Capabilities { scope: "local" }
    }
}
