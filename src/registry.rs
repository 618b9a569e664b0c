//! Persistent registry of volume definitions
//!
//! The registry owns the volume map behind a single read/write lock and
//! rewrites the whole state file after every change. Mount and unmount work
//! against a [`VolumeHandle`], which carries its own lock and connection
//! counter so a slow mount never blocks unrelated registry calls.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info};

use crate::error::{DriverError, Result};
use crate::volume::Volume;

/// State file name under `<root>/state`
pub const STATE_FILE: &str = "jfs-state.json";

/// A registered volume plus its live mount state
#[derive(Debug)]
pub struct VolumeHandle {
    id: String,
    volume: Volume,
    connections: AtomicI64,
    /// Serializes mount/unmount of this volume
    op_lock: Arc<tokio::sync::Mutex<()>>,
}

impl VolumeHandle {
    fn new(id: String, volume: Volume) -> Self {
        let connections = AtomicI64::new(volume.connections);
        Self {
            id,
            volume,
            connections,
            op_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Name the volume is registered under
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The immutable definition (its `connections` field is stale; use
    /// [`Self::connections`])
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn mountpoint(&self) -> &Path {
        &self.volume.mountpoint
    }

    pub fn connections(&self) -> i64 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Exclusive access for a mount or unmount of this volume
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    /// Record a successful mount; returns the new count
    pub fn connect(&self) -> i64 {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record an unmount; the count may go negative
    pub fn disconnect(&self) -> i64 {
        self.connections.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Definition with the current connection count filled in
    pub fn snapshot(&self) -> Volume {
        let mut volume = self.volume.clone();
        volume.connections = self.connections();
        volume
    }
}

/// A registered volume whose mount/unmount lock is held
#[derive(Debug)]
pub struct LockedVolume {
    handle: Arc<VolumeHandle>,
    _guard: OwnedMutexGuard<()>,
}

impl Deref for LockedVolume {
    type Target = VolumeHandle;

    fn deref(&self) -> &VolumeHandle {
        &self.handle
    }
}

/// Volume name → definition map, persisted to a JSON state file
pub struct VolumeRegistry {
    volumes_root: PathBuf,
    state_path: PathBuf,
    volumes: RwLock<HashMap<String, Arc<VolumeHandle>>>,
    /// Held for each state file rewrite
    state_lock: Mutex<()>,
}

impl VolumeRegistry {
    /// Open the registry rooted at `root`.
    ///
    /// Mountpoints live under `root/volumes`, state in
    /// `root/state/jfs-state.json`. A missing state file means an empty
    /// registry; any other read or parse failure is returned.
    pub fn open(root: &Path) -> Result<Self> {
        let volumes_root = root.join("volumes");
        let state_dir = root.join("state");
        let state_path = state_dir.join(STATE_FILE);

        std::fs::create_dir_all(&state_dir)?;

        let volumes = match std::fs::read(&state_path) {
            Ok(data) => {
                let stored: HashMap<String, Volume> = serde_json::from_slice(&data)?;
                info!("Loaded {} volume(s) from {:?}", stored.len(), state_path);
                stored
                    .into_iter()
                    .map(|(id, v)| (id.clone(), Arc::new(VolumeHandle::new(id, v))))
                    .collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state found at {:?}", state_path);
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            volumes_root,
            state_path,
            volumes: RwLock::new(volumes),
            state_lock: Mutex::new(()),
        })
    }

    pub fn volumes_root(&self) -> &Path {
        &self.volumes_root
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Register a new volume.
    ///
    /// Re-creating an existing name with an identical definition succeeds
    /// without change; a different definition is rejected.
    pub fn create(&self, id: &str, options: &HashMap<String, String>) -> Result<Volume> {
        let volume = Volume::from_request(id, options, &self.volumes_root)?;

        let mut volumes = self.volumes.write();
        if let Some(existing) = volumes.get(id) {
            if existing.volume().same_definition(&volume) {
                debug!("Volume {} already registered with same definition", id);
                return Ok(existing.snapshot());
            }
            return Err(DriverError::AlreadyExists(id.to_string()));
        }

        volumes.insert(
            id.to_string(),
            Arc::new(VolumeHandle::new(id.to_string(), volume.clone())),
        );
        self.save_state(&volumes);

        info!("Created volume {} (source {})", id, redact_source(&volume.source));
        Ok(volume)
    }

    /// Unregister a volume and delete its (empty) mountpoint directory
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut volumes = self.volumes.write();

        let handle = volumes
            .get(id)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(id.to_string()))?;

        // A mount or unmount in flight counts as use
        let _guard = handle
            .op_lock
            .try_lock()
            .map_err(|_| DriverError::InUse(id.to_string()))?;
        if handle.connections() != 0 {
            return Err(DriverError::InUse(id.to_string()));
        }

        match std::fs::remove_dir(handle.mountpoint()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Mountpoint {:?} already gone", handle.mountpoint());
            }
            Err(e) => return Err(e.into()),
        }

        volumes.remove(id);
        self.save_state(&volumes);

        info!("Removed volume {}", id);
        Ok(())
    }

    /// Current definition of a volume
    pub fn get(&self, id: &str) -> Result<Volume> {
        self.handle(id).map(|h| h.snapshot())
    }

    /// All volumes as (name, definition) pairs, sorted by name
    pub fn list(&self) -> Vec<(String, Volume)> {
        let volumes = self.volumes.read();
        let mut all: Vec<_> = volumes
            .iter()
            .map(|(id, h)| (id.clone(), h.snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Mountpoint of a volume
    pub fn path(&self, id: &str) -> Result<PathBuf> {
        self.handle(id).map(|h| h.mountpoint().to_path_buf())
    }

    /// Shared handle used for mount/unmount outside the registry lock
    pub fn handle(&self, id: &str) -> Result<Arc<VolumeHandle>> {
        self.volumes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(id.to_string()))
    }

    /// Look up a volume and take its mount/unmount lock.
    ///
    /// Fails with `NotFound` if the volume was removed, or removed and
    /// re-created, while waiting for the lock.
    pub async fn lock_volume(&self, id: &str) -> Result<LockedVolume> {
        let handle = self.handle(id)?;
        let guard = handle.op_lock.clone().lock_owned().await;

        if !self.is_registered(id, &handle) {
            debug!("Volume {} was removed while waiting for its lock", id);
            return Err(DriverError::NotFound(id.to_string()));
        }
        Ok(LockedVolume {
            handle,
            _guard: guard,
        })
    }

    fn is_registered(&self, id: &str, handle: &Arc<VolumeHandle>) -> bool {
        self.volumes
            .read()
            .get(id)
            .map_or(false, |current| Arc::ptr_eq(current, handle))
    }

    /// Rewrite the state file with current connection counts
    pub fn persist(&self) {
        let volumes = self.volumes.read();
        self.save_state(&volumes);
    }

    /// Best-effort write of the whole registry; failures are only logged
    fn save_state(&self, volumes: &HashMap<String, Arc<VolumeHandle>>) {
        // persist() holds only the read lock
        let _writing = self.state_lock.lock();
        let snapshot: HashMap<&str, Volume> = volumes
            .iter()
            .map(|(id, h)| (id.as_str(), h.snapshot()))
            .collect();

        if let Err(e) = write_state(&self.state_path, &snapshot) {
            error!("Failed to save state to {:?}: {}", self.state_path, e);
        }
    }
}

/// Write the snapshot to a sibling temp file and rename it over `path`
fn write_state(path: &Path, snapshot: &HashMap<&str, Volume>) -> Result<()> {
    let data = serde_json::to_vec(snapshot)?;
    let tmp = path.with_extension("json.tmp");

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&tmp)?;
    file.write_all(&data)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Strip any password from a metadata URL before logging it
fn redact_source(source: &str) -> String {
    let Some((scheme, rest)) = source.split_once("://") else {
        return source.to_string();
    };
    match rest.split_once('@') {
        Some((userinfo, host)) => match userinfo.split_once(':') {
            Some((user, _)) => format!("{}://{}:****@{}", scheme, user, host),
            None => source.to_string(),
        },
        None => source.to_string(),
    }
}
