use std::path::Path;

use log::info;

use crate::data::store::write_atomic;
use crate::error::ControlError;
use crate::types::config::Settings;


/// Load `Settings` from a YAML file. A missing file yields the defaults;
/// a malformed one is a validation error.
pub fn load(path: &Path) -> Result<Settings, ControlError> {
    if !path.exists() {
        info!("no settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ControlError::io(format!("cannot read {}", path.display()), e))?;
    parse(&content)
}


/// Parse settings from a YAML string. Empty input yields the defaults.
pub fn parse(content: &str) -> Result<Settings, ControlError> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(content).map_err(|e| ControlError::validation("settings", e.to_string()))
}


/// Save `Settings` as YAML.
pub fn save(path: &Path, settings: &Settings) -> Result<(), ControlError> {
    let content = serde_yaml::to_string(settings)
        .map_err(|e| ControlError::runtime("serialize settings", e.to_string()))?;
    write_atomic(path, content.as_bytes())
}
