//! XDG Base Directory locations for configuration and library data.

use crate::error::ApiError;
use std::path::{Component, Path, PathBuf};

/// `$XDG_DATA_HOME`, falling back to the platform data directory.
pub fn data_home() -> Option<PathBuf> {
    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        if !xdg_data_home.is_empty() {
            return Some(PathBuf::from(xdg_data_home));
        }
    }
    directories::BaseDirs::new().map(|dirs| dirs.data_dir().to_path_buf())
}

/// `$XDG_CONFIG_HOME`, falling back to the platform config directory.
pub fn config_home() -> Result<PathBuf, ApiError> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Ok(PathBuf::from(xdg_config_home));
        }
    }
    directories::BaseDirs::new()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| {
            ApiError::ConfigError(
                "Could not determine XDG config home directory (HOME not set)".to_string(),
            )
        })
}

/// `$XDG_CONFIG_HOME/mulifs/config.toml`
pub fn global_config_path() -> Result<PathBuf, ApiError> {
    Ok(config_home()?.join("mulifs").join("config.toml"))
}

/// Data directory for the library rooted at `root`.
///
/// `/srv/music` maps to `$XDG_DATA_HOME/mulifs/srv/music/`, so several
/// libraries never share a store.
pub fn library_data_dir(root: &Path) -> Result<PathBuf, ApiError> {
    let data_home = data_home().ok_or_else(|| {
        ApiError::ConfigError("Could not determine XDG data home directory (HOME not set)".to_string())
    })?;
    // The root may not exist yet on first mount.
    let resolved = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

    let mut data_dir = data_home.join("mulifs");
    for component in resolved.components() {
        if let Component::Normal(name) = component {
            data_dir.push(name);
        }
    }
    Ok(data_dir)
}
