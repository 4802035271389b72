//! Merge policy: the defaults every configuration starts from.

use crate::config::MulifsConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the built-in defaults as the lowest-precedence source.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&MulifsConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
