use super::{default_global_config_path, ConfigError, Settings};
use std::path::Path;

/// Loads and validates settings from `path`, or from the default global path.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_global_config_path()?,
    };
    let settings = Settings::from_path(&path)?;
    settings.validate()?;
    Ok(settings)
}
