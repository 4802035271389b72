//! LibraryConfig and resolve_paths for the backing root and metadata store.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Library locations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Backing directory holding `playlists/`, `drop/` and `<artist>/<album>/`.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Metadata store directory. Defaults to a per-root directory under the
    /// XDG data home.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl LibraryConfig {
    /// Resolve `(root, store_path)` to absolute locations.
    pub fn resolve_paths(&self) -> Result<(PathBuf, PathBuf), ApiError> {
        let root = self.root.clone().ok_or_else(|| {
            ApiError::ConfigError(
                "library.root is not set (use --root or MULIFS__LIBRARY__ROOT)".to_string(),
            )
        })?;
        let root = absolute(root)?;

        let store_path = match &self.store_path {
            Some(path) => absolute(path.clone())?,
            None => xdg::library_data_dir(&root)?.join("store"),
        };
        Ok((root, store_path))
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf, ApiError> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ApiError::ConfigError(format!("Failed to read current directory: {}", e)))?;
    Ok(cwd.join(path))
}
