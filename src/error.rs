use std::io;
use thiserror::Error;

/// Main error type for volume driver operations
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{0}")]
    Validation(String),

    #[error("volume {0} not found")]
    NotFound(String),

    #[error("volume {0} is in use")]
    InUse(String),

    #[error("volume {0} already exists with a different definition")]
    AlreadyExists(String),

    #[error("{0} already exist and it's not a directory")]
    InvalidMountpoint(String),

    #[error("{program} {action} failed: {output}")]
    Subprocess {
        /// Program that was run
        program: String,
        /// Subcommand or short label (format, auth, mount, umount)
        action: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Combined stdout+stderr with secrets masked
        output: String,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("mountpoint {mountpoint} not ready after {attempts} attempts: {cause}")]
    ReadinessTimeout {
        mountpoint: String,
        attempts: u32,
        cause: String,
    },

    #[error("state file error: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// Short stable tag for the error class, used in transport logs
    pub fn kind(&self) -> &'static str {
        match self {
            DriverError::Validation(_) => "validation",
            DriverError::NotFound(_) => "not_found",
            DriverError::InUse(_) => "in_use",
            DriverError::AlreadyExists(_) => "already_exists",
            DriverError::InvalidMountpoint(_) => "invalid_mountpoint",
            DriverError::Subprocess { .. } => "subprocess",
            DriverError::Spawn { .. } => "spawn",
            DriverError::ReadinessTimeout { .. } => "readiness_timeout",
            DriverError::State(_) => "state",
            DriverError::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(e: serde_json::Error) -> Self {
        DriverError::State(e.to_string())
    }
}

/// Result type alias for volume driver operations
pub type Result<T> = std::result::Result<T, DriverError>;
