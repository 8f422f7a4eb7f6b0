//! XDG Base Directory paths for proctor.
//!
//! The daemon keeps its config under the XDG config home and its session
//! database and evidence snapshots under the XDG data home, regardless of
//! platform.

use std::path::PathBuf;

/// Get the proctor config directory.
///
/// Returns `$XDG_CONFIG_HOME/proctor` if set, otherwise `~/.config/proctor`.
///
/// # Examples
///
/// ```
/// use proctor_paths::config_dir;
///
/// let config = config_dir();
/// let file = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("proctor")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/proctor")
    } else {
        PathBuf::from(".config/proctor")
    }
}

/// Get the proctor data directory.
///
/// Returns `$XDG_DATA_HOME/proctor` if set, otherwise `~/.local/share/proctor`.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join("proctor")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share/proctor")
    } else {
        PathBuf::from(".local/share/proctor")
    }
}

/// Path of the user-level config file.
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default location of the SQLite session database.
pub fn database_path() -> PathBuf {
    data_dir().join("proctor.db")
}

/// Default root directory for evidence snapshots.
///
/// Each session gets its own subdirectory below this root.
pub fn evidence_dir() -> PathBuf {
    data_dir().join("evidence")
}
