//! XDG Base Directory paths for storage-access.
//!
//! | Purpose | XDG Variable | Default |
//! |---------|--------------|---------|
//! | Data | `$XDG_DATA_HOME` | `~/.local/share` |
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` |
//!
//! The sandbox root and the preferences file default to the data
//! directory; configuration can point them anywhere.

use std::path::PathBuf;

use directories::BaseDirs;

/// Application directory name under the XDG bases.
pub const APP_NAME: &str = "storage-access";

// ═══════════════════════════════════════════════════════════════════════════
// XDG Primitives
// ═══════════════════════════════════════════════════════════════════════════

/// Get the user's home directory.
///
/// Returns `$HOME` or falls back to `/tmp` if not set.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Returns `$XDG_DATA_HOME` or falls back to `~/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".local").join("share"))
}

/// Returns `$XDG_CONFIG_HOME` or falls back to `~/.config`.
pub fn xdg_config_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".config"))
}

// ═══════════════════════════════════════════════════════════════════════════
// Application Paths
// ═══════════════════════════════════════════════════════════════════════════

/// Persistent state: `$XDG_DATA_HOME/storage-access`.
pub fn data_dir() -> PathBuf {
    xdg_data_home().join(APP_NAME)
}

/// `$XDG_CONFIG_HOME/storage-access`.
pub fn config_dir() -> PathBuf {
    xdg_config_home().join(APP_NAME)
}

/// Default app-private sandbox.
pub fn default_sandbox_root() -> PathBuf {
    data_dir().join("files")
}

/// Default location of the persisted grant.
pub fn preferences_path() -> PathBuf {
    data_dir().join("preferences.json")
}
