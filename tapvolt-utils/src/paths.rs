//! Path utilities for tapvolt
//!
//! Handles XDG Base Directory locations for config, state, and data files.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Application identifier for XDG directories
const APP_NAME: &str = "tapvolt";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/tapvolt` or `~/.config/tapvolt`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(fallback_config_dir)
}

/// Get the state directory (logs, transient client state)
///
/// Location: `$XDG_STATE_HOME/tapvolt` or `~/.local/state/tapvolt`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(fallback_state_dir)
}

/// Get the data directory (persistent data like the device identity)
///
/// Location: `$XDG_DATA_HOME/tapvolt` or `~/.local/share/tapvolt`
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(fallback_data_dir)
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/tapvolt/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Get the persisted settings file path
///
/// Location: `$XDG_CONFIG_HOME/tapvolt/settings.json`
pub fn settings_file() -> PathBuf {
    config_dir().join("settings.json")
}

/// Get the persistent device identity file path
///
/// Location: `$XDG_DATA_HOME/tapvolt/device-id`
pub fn device_id_file() -> PathBuf {
    data_dir().join("device-id")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

// Fallback implementations when ProjectDirs is unavailable

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn fallback_config_dir() -> PathBuf {
    home_dir().join(".config").join(APP_NAME)
}

fn fallback_state_dir() -> PathBuf {
    home_dir().join(".local").join("state").join(APP_NAME)
}

fn fallback_data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join(APP_NAME)
}
