//! jfs-volume-driver: a container volume plugin backed by JuiceFS
//!
//! This library keeps a persistent registry of named volumes and mounts them
//! on demand by driving the `juicefs` command-line tools.
//!
//! # Architecture
//!
//! - **Registry**: Named volumes, their options and connection counts,
//!   persisted to a JSON state file after every mutation.
//! - **Options**: Translates a volume's free-form options into format/mount
//!   arguments and environment for the community (metaurl) or managed
//!   (token) CLI.
//! - **Backends**: One per CLI flavor, implementing the `Backend` trait to
//!   prepare and launch a detached mount.
//! - **Mount Orchestrator**: Ensures the mountpoint, launches the right
//!   backend and waits for the readiness probe.
//! - **Plugin**: The HTTP-over-Unix-socket protocol the container engine
//!   speaks, routed onto the `Driver` facade.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jfs_volume_driver::config::Config;
//! use jfs_volume_driver::driver::Driver;
//! use jfs_volume_driver::plugin;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"config.yaml".into())?;
//! let driver = Arc::new(Driver::from_config(&config)?);
//!
//! let listener = plugin::bind(&config.socket)?;
//! let shutdown = Arc::new(tokio::sync::Notify::new());
//! plugin::serve(listener, driver, shutdown).await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod driver;
pub mod env;
pub mod error;
pub mod mount;
pub mod options;
pub mod plugin;
pub mod probe;
pub mod process;
pub mod redact;
pub mod registry;
pub mod volume;

#[cfg(test)]
mod testutil;

pub use error::{DriverError, Result};
