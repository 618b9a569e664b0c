//! Environment variable assignments for CLI subprocesses
//!
//! Volumes may carry an `env` option holding comma-separated `KEY=VALUE`
//! pairs. These are layered on top of the driver's own environment when the
//! juicefs CLI is invoked, and never forwarded as command-line flags.

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::warn;

/// Disables the CLI's self-update check
pub const NO_UPDATE_VAR: &str = "JFS_NO_UPDATE";

/// Pins the mount helper binary so the CLI never downloads one
pub const MOUNT_BIN_VAR: &str = "JFS_MOUNT_BIN";

/// Valid environment variable names
static ENV_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Parse an `env` option value like `A=1,B=x=y` into assignments.
///
/// Items without `=` or with an invalid name are skipped with a warning.
pub fn parse_env_option(value: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();

    for item in value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let Some((key, val)) = item.split_once('=') else {
            warn!("Ignoring env entry without '=': {:?}", item);
            continue;
        };

        if !ENV_NAME_PATTERN.is_match(key) {
            warn!("Ignoring env entry with invalid name: {:?}", key);
            continue;
        }

        vars.push((key.to_string(), val.to_string()));
    }

    vars
}

/// Ordered environment overrides applied on top of the inherited environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountEnv {
    vars: Vec<(String, String)>,
}

impl MountEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable; a later set of the same name wins
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.vars.retain(|(k, _)| k != &key);
        self.vars.push((key, value.into()));
    }

    pub fn extend(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (k, v) in vars {
            self.set(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Add the overrides to a command; the parent environment is inherited
    pub fn apply(&self, cmd: &mut Command) {
        cmd.envs(self.iter());
    }
}
