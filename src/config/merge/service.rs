//! MergeService: orchestrates sources, applies merge policy, deserializes to MulifsConfig.

use crate::config::sources::{environment, global_file};
use crate::config::MulifsConfig;
use config::{ConfigError, File, FileFormat};
use std::path::Path;

use super::policy;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from the standard sources plus an optional explicit file.
    /// Precedence: defaults -> global file -> explicit file -> environment.
    pub fn load(explicit: Option<&Path>) -> Result<MulifsConfig, ConfigError> {
        let builder = policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = match explicit {
            Some(path) => builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            ),
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Load config from one file with environment overlay, skipping the global file.
    pub fn load_from_file(path: &Path) -> Result<MulifsConfig, ConfigError> {
        let builder = policy::builder_with_defaults()?;
        let builder = builder.add_source(
            File::from(path.to_path_buf())
                .format(FileFormat::Toml)
                .required(true),
        );
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }
}
