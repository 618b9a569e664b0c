//! jfs-volume-driver daemon entry point

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jfs_volume_driver::config::Config;
use jfs_volume_driver::driver::Driver;
use jfs_volume_driver::plugin;
use jfs_volume_driver::probe::is_mounted_root;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: jfs-volume-driver [config.yaml]");
    eprintln!("       jfs-volume-driver probe <path>");
    eprintln!();
    eprintln!("jfs-volume-driver - Volume plugin serving JuiceFS volumes");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Optional path to configuration file");
    eprintln!("  probe <path>   Exit 0 if <path> is a mounted filesystem root, 1 otherwise");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG       Log filter, overrides the configured level");
    eprintln!("  DEBUG          Force debug logging when set to a true value");
}

fn probe(path: &Path) -> ! {
    if is_mounted_root(path) {
        println!("{} is a mounted filesystem root", path.display());
        std::process::exit(0);
    }
    println!("{} is not a mounted filesystem root", path.display());
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.as_slice() {
        [_] => None,
        [_, cmd, path] if cmd == "probe" => probe(Path::new(path)),
        [_, flag] if flag == "-h" || flag == "--help" => {
            print_usage();
            return Ok(());
        }
        [_, path] => Some(PathBuf::from(path)),
        _ => {
            print_usage();
            std::process::exit(1);
        }
    };

    let mut config = match &config_path {
        Some(path) => match Config::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    config.apply_debug_env(std::env::var("DEBUG").ok().as_deref());

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("jfs-volume-driver starting");
    if let Some(path) = &config_path {
        info!("Loaded configuration from {:?}", path);
    }

    let driver = match Driver::from_config(&config) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!("Failed to load volume state under {:?}: {}", config.root, e);
            std::process::exit(1);
        }
    };
    info!(
        "Loaded {} volume(s) from {:?}",
        driver.list().len(),
        driver.registry().state_path()
    );

    let listener = match plugin::bind(&config.socket) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to listen on {:?}: {}", config.socket, e);
            std::process::exit(1);
        }
    };
    let socket = config.socket.clone();
    let _cleanup = scopeguard::guard(socket, |socket| {
        if let Err(e) = std::fs::remove_file(&socket) {
            error!("Failed to remove socket {:?}: {}", socket, e);
        }
    });

    // Set up signal handling for graceful shutdown
    let shutdown = Arc::new(Notify::new());
    let s = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        s.notify_one();
    })?;

    info!("Listening on {:?}", config.socket);
    plugin::serve(listener, driver, shutdown).await;

    info!("Shutting down");
    Ok(())
}
