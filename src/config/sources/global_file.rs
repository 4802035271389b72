//! Global config file source: `$XDG_CONFIG_HOME/mulifs/config.toml`, optional.

use crate::config::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Ok(path) = xdg::global_config_path() else {
        return Ok(builder);
    };
    Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(false)))
}
