//! Configuration parsing and structures

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::probe::{DEFAULT_ATTEMPTS, DEFAULT_INTERVAL};

pub const DEFAULT_ROOT: &str = "/jfs";
pub const DEFAULT_SOCKET: &str = "/run/docker/plugins/jfs.sock";
/// Community Edition CLI (metaurl-based)
pub const DEFAULT_COMMUNITY_CLI: &str = "/bin/juicefs";
/// Enterprise/Cloud CLI (token-based)
pub const DEFAULT_MANAGED_CLI: &str = "/usr/bin/juicefs";
pub const DEFAULT_UNMOUNT_CLI: &str = "umount";
/// Mount helper bundled into the plugin image
pub const DEFAULT_MOUNT_HELPER: &str = "/bin/jfsmount";

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Root directory for mountpoints and state
    pub root: Option<PathBuf>,

    /// Plugin socket path
    pub socket: Option<PathBuf>,

    /// Community Edition CLI path
    pub community_cli: Option<PathBuf>,

    /// Managed/Enterprise CLI path
    pub managed_cli: Option<PathBuf>,

    /// Program used to unmount volumes
    pub unmount_cli: Option<PathBuf>,

    /// Bundled mount helper, pinned when present on disk
    pub mount_helper: Option<PathBuf>,

    /// Mount readiness polling
    #[serde(default)]
    pub readiness: RawReadinessConfig,
}

/// Readiness probe settings, all optional
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawReadinessConfig {
    /// Number of polls before giving up
    pub attempts: Option<u32>,

    /// Delay after each failed poll (e.g., "1s", "500ms")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Root directory; volumes under `root/volumes`, state under `root/state`
    pub root: PathBuf,

    /// Plugin socket path
    pub socket: PathBuf,

    /// CLI locations
    pub cli: CliConfig,

    /// Readiness probe settings
    pub readiness: ReadinessConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// External programs the driver invokes
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub community_cli: PathBuf,
    pub managed_cli: PathBuf,
    pub unmount_cli: PathBuf,
    pub mount_helper: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            community_cli: PathBuf::from(DEFAULT_COMMUNITY_CLI),
            managed_cli: PathBuf::from(DEFAULT_MANAGED_CLI),
            unmount_cli: PathBuf::from(DEFAULT_UNMOUNT_CLI),
            mount_helper: PathBuf::from(DEFAULT_MOUNT_HELPER),
        }
    }
}

/// Readiness probe settings (resolved)
#[derive(Debug, Clone, Copy)]
pub struct ReadinessConfig {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        RawConfig::default().resolve()
    }
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by filling in defaults
    pub fn resolve(self) -> Config {
        let RawConfig {
            logging,
            root,
            socket,
            community_cli,
            managed_cli,
            unmount_cli,
            mount_helper,
            readiness,
        } = self;

        let cli_defaults = CliConfig::default();
        let readiness_defaults = ReadinessConfig::default();

        Config {
            logging,
            root: root.unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT)),
            socket: socket.unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET)),
            cli: CliConfig {
                community_cli: community_cli.unwrap_or(cli_defaults.community_cli),
                managed_cli: managed_cli.unwrap_or(cli_defaults.managed_cli),
                unmount_cli: unmount_cli.unwrap_or(cli_defaults.unmount_cli),
                mount_helper: mount_helper.unwrap_or(cli_defaults.mount_helper),
            },
            readiness: ReadinessConfig {
                attempts: readiness.attempts.unwrap_or(readiness_defaults.attempts),
                interval: readiness.interval.unwrap_or(readiness_defaults.interval),
            },
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(raw.resolve())
    }

    /// Apply the `DEBUG` environment toggle to the log level
    pub fn apply_debug_env(&mut self, debug: Option<&str>) {
        if debug.map(parse_bool).unwrap_or(false) {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.readiness.attempts == 0 {
            return Err(ConfigError::ValidationError(
                "readiness.attempts must be at least 1".to_string(),
            ));
        }

        let paths = [
            ("root", &self.root),
            ("socket", &self.socket),
            ("community_cli", &self.cli.community_cli),
            ("managed_cli", &self.cli.managed_cli),
            ("unmount_cli", &self.cli.unmount_cli),
        ];
        for (field, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} cannot be empty",
                    field
                )));
            }
        }

        Ok(())
    }
}

/// Lenient boolean parsing for environment toggles
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "y" | "yes" | "on"
    )
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
