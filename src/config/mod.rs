//! Configuration
//!
//! Layered with the `config` crate, lowest precedence first:
//! built-in defaults, the global `$XDG_CONFIG_HOME/mulifs/config.toml`, an
//! explicit `--config` file, then `MULIFS__SECTION__KEY` environment
//! variables. Command-line flags are applied on top by the caller.

pub mod facade;
pub mod library {
    pub mod storage_paths;
}
pub mod merge {
    pub mod policy;
    pub mod service;
}
pub mod paths {
    pub mod xdg_root;
}
pub mod sources {
    pub mod environment;
    pub mod global_file;
}

pub use crate::logging::LoggingConfig;
pub use facade::ConfigLoader;
pub use library::storage_paths::LibraryConfig;
pub use paths::xdg_root as xdg;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_fs_name() -> String {
    "mulifs".to_string()
}

fn default_true() -> bool {
    true
}

fn default_attr_ttl() -> u64 {
    1
}

/// FUSE mount settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Where the library is mounted. Required by `mulifs mount` unless given on the command line.
    #[serde(default)]
    pub mountpoint: Option<PathBuf>,

    #[serde(default = "default_fs_name")]
    pub fs_name: String,

    /// Let other users access the mount (needs `user_allow_other` in fuse.conf).
    #[serde(default)]
    pub allow_other: bool,

    /// Unmount when the process exits (ignored on macOS).
    #[serde(default = "default_true")]
    pub auto_unmount: bool,

    /// Kernel attribute and entry cache lifetime, in seconds.
    #[serde(default = "default_attr_ttl")]
    pub attr_ttl_secs: u64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mountpoint: None,
            fs_name: default_fs_name(),
            allow_other: false,
            auto_unmount: default_true(),
            attr_ttl_secs: default_attr_ttl(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MulifsConfig {
    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub mount: MountConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MulifsConfig {
    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> Result<String, crate::error::ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::error::ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
