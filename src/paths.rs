//! Centralized path resolution for converge
//!
//! # Environment Variables
//!
//! - `CONVERGE_STATE_DIR` - Override the state directory (reports, backups)
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `CONVERGE_STATE_DIR` environment variable
//! 2. `/var/lib/converge` when running as root
//! 3. `XDG_STATE_HOME/converge` (if set)
//! 4. `~/.local/state/converge`

use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "CONVERGE_STATE_DIR";

/// State directory used by root runs
pub const SYSTEM_STATE_DIR: &str = "/var/lib/converge";

/// Get the converge state directory path
pub fn state_dir(is_root: bool) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if is_root {
        log::debug!("Using system state dir: {SYSTEM_STATE_DIR}");
        return Ok(PathBuf::from(SYSTEM_STATE_DIR));
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("converge");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("converge");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Default location for run reports
pub fn reports_dir(is_root: bool) -> Result<PathBuf> {
    Ok(state_dir(is_root)?.join("reports"))
}

/// Default location for per-run backups
pub fn backups_dir(is_root: bool) -> Result<PathBuf> {
    Ok(state_dir(is_root)?.join("backups"))
}

/// Expand ~ and environment variables, leaving unknown variables as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand ~ and environment variables, failing on undefined variables.
pub fn expand_strict(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| anyhow!("cannot expand '{path}': ${} is not set", e.var_name))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

// ============================================================================
// Tests
// ============================================================================
