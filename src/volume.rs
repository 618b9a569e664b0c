//! Volume definitions

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};
use crate::options::BackendMode;

/// Option naming the backend filesystem
pub const NAME_OPTION: &str = "name";

/// Option holding a metadata-service URL, promoted to the volume source
pub const METAURL_OPTION: &str = "metaurl";

/// Scheme assumed for a metadata URL given without one
pub const DEFAULT_META_SCHEME: &str = "redis://";

/// A volume as persisted in the state file.
///
/// Everything except `connections` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Backend filesystem name, passed positionally to the CLI
    #[serde(rename = "Name")]
    pub name: String,

    /// Options not consumed into `name` or `source`
    #[serde(rename = "Options", default)]
    pub options: HashMap<String, String>,

    /// Metadata URL (community mode) or managed volume name
    #[serde(rename = "Source")]
    pub source: String,

    /// Local directory the filesystem is mounted on
    #[serde(rename = "Mountpoint")]
    pub mountpoint: PathBuf,

    /// Active mount requests
    #[serde(default)]
    pub connections: i64,
}

impl Volume {
    /// Build a volume from a create request.
    ///
    /// `volumes_root` is the directory holding all mountpoints; the mountpoint
    /// is `volumes_root/<id>`.
    pub fn from_request(
        id: &str,
        request_options: &HashMap<String, String>,
        volumes_root: &Path,
    ) -> Result<Self> {
        validate_id(id)?;

        let mut name = None;
        let mut source = None;
        let mut options = HashMap::new();

        for (key, val) in request_options {
            match key.as_str() {
                NAME_OPTION => name = Some(val.clone()),
                METAURL_OPTION => {
                    source = Some(if val.contains("://") {
                        val.clone()
                    } else {
                        format!("{}{}", DEFAULT_META_SCHEME, val)
                    });
                }
                _ => {
                    options.insert(key.clone(), val.clone());
                }
            }
        }

        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(DriverError::Validation("'name' option required".to_string())),
        };
        let source = source.unwrap_or_else(|| name.clone());

        Ok(Self {
            name,
            options,
            source,
            mountpoint: volumes_root.join(id),
            connections: 0,
        })
    }

    /// Backend flow selected by the source
    pub fn mode(&self) -> BackendMode {
        BackendMode::for_source(&self.source)
    }

    /// Same definition, ignoring the live connection count
    pub fn same_definition(&self, other: &Volume) -> bool {
        self.name == other.name
            && self.options == other.options
            && self.source == other.source
            && self.mountpoint == other.mountpoint
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(DriverError::Validation("volume name required".to_string()));
    }
    if id == "." || id == ".." || id.contains('/') || id.contains('\0') {
        return Err(DriverError::Validation(format!(
            "invalid volume name: {:?}",
            id
        )));
    }
    Ok(())
}
