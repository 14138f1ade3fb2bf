//! osr-wb: Offscreen-Rendered Web Browser
//!
//! Main entry point. Initializes the global allocator, sets up logging,
//! loads the configuration and launches the shell.
//!
//! Configuration comes from the first argument, else `OSR_WB_CONFIG`,
//! else built-in defaults. `RUST_LOG` overrides the log filter.

use anyhow::{Context, Result};
use osr_browser::DiagnosticEngine;
use osr_ui::AppConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Environment variable naming the config file
const CONFIG_ENV: &str = "OSR_WB_CONFIG";

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    info!("osr-wb starting...");
    info!("Using mimalloc allocator");

    let config = match config_path() {
        Some(path) => {
            info!("Loading config from {}", path.display());
            AppConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => AppConfig::default(),
    };

    osr_ui::run(config, Box::new(DiagnosticEngine::new()))?;

    info!("osr-wb shutting down");
    Ok(())
}
