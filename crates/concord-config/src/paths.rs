//! Configuration directory paths
//!
//! Uses XDG directories via `dirs` crate.
//!
//! Platform-specific locations:
//! - Linux: `~/.config/concord-console/`
//! - macOS: `~/Library/Application Support/concord-console/`
//! - Windows: `%APPDATA%\concord-console\`

use anyhow::{Context, Result};
use std::path::PathBuf;

pub(crate) const APP_NAME: &str = "concord-console";

/// Get the application config directory
///
/// The directory is not created; only the config file lookup uses it and a
/// missing directory simply means "no config there".
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join(APP_NAME))
}

/// Get path to app config file
pub fn app_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
