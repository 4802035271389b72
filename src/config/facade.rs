//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::MulifsConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file, `explicit` (if any) and environment.
    pub fn load(explicit: Option<&Path>) -> Result<MulifsConfig, ConfigError> {
        MergeService::load(explicit)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<MulifsConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    /// Create default configuration.
    pub fn default() -> MulifsConfig {
        MulifsConfig::default()
    }
}
