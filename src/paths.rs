//! Centralized path resolution for steward
//!
//! # Environment Variables
//!
//! - `STEWARD_CONFIG` - Path of the resources document
//! - `STEWARD_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/steward`)
//! - `STEWARD_SYSCTL_ROOT` - Override the kernel parameter root (`/proc/sys`)
//!
//! # Path Resolution Priority
//!
//! For config_file():
//! 1. `--config` flag
//! 2. `STEWARD_CONFIG` environment variable
//! 3. `config_dir()/resources.toml`
//!
//! For config_dir():
//! 1. `STEWARD_CONFIG_DIR` environment variable
//! 2. Platform config dir joined with `steward`
//!    - Linux: `$XDG_CONFIG_HOME/steward` or `~/.config/steward`
//!    - macOS: `~/Library/Application Support/steward`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the resources document
pub const ENV_CONFIG: &str = "STEWARD_CONFIG";

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STEWARD_CONFIG_DIR";

/// Environment variable for the kernel parameter root
pub const ENV_SYSCTL_ROOT: &str = "STEWARD_SYSCTL_ROOT";

/// File name of the resources document inside the config dir
pub const CONFIG_FILE: &str = "resources.toml";

/// Default kernel parameter root
pub const SYSCTL_DIR: &str = "/proc/sys";

/// Get the steward config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    let base = dirs::config_dir().context("Could not determine config directory")?;
    let path = base.join("steward");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the path of the resources document
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(&path.to_string_lossy()));
    }

    if let Ok(file) = std::env::var(ENV_CONFIG) {
        let path = expand(&file);
        log::debug!("Using config from {}: {}", ENV_CONFIG, path.display());
        return Ok(path);
    }

    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Get the root every sysctl parameter path is resolved under
pub fn sysctl_root() -> PathBuf {
    match std::env::var(ENV_SYSCTL_ROOT) {
        Ok(dir) if !dir.is_empty() => expand(&dir),
        _ => PathBuf::from(SYSCTL_DIR),
    }
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
