//! Converter settings.
//!
//! Settings are read from a JSON file, either given explicitly or found at
//! the platform config location (`<config_dir>/datasetjson/config.json`).
//! Every field is optional in the file; missing fields take their defaults.
//! Command-line flags are applied on top by the binary.

use crate::batch::{BatchOptions, OUTPUT_EXTENSION};
use crate::dataset::{ConversionOptions, DEFAULT_DATA_FILE_SUFFIX, Formatting};
use crate::error::{ConvertError, Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Pretty-print the metadata document
    pub pretty: bool,
    /// Write rows to a sibling JSON-Lines file
    pub external: bool,
    /// Worker pool size; unset or non-positive converts sequentially
    pub threads: Option<i64>,
    /// Appended to the output stem to name the external row file
    pub data_file_suffix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pretty: false,
            external: false,
            threads: None,
            data_file_suffix: DEFAULT_DATA_FILE_SUFFIX.to_owned(),
        }
    }
}

impl Settings {
    pub fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            formatting: Formatting::from_pretty(self.pretty),
            external: self.external,
            data_file_suffix: self.data_file_suffix.clone(),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            workers: self.threads,
            conversion: self.conversion_options(),
        }
    }

    fn validate(self) -> Result<Self> {
        let suffix = self.data_file_suffix.as_str();
        if suffix.is_empty() || suffix.contains(['/', '\\']) {
            return Err(ConvertError::Config(format!(
                "data_file_suffix must be a non-empty file name suffix, got {suffix:?}"
            )));
        }
        // `<stem><suffix>` must never name the `<stem>.json` metadata document.
        let document_suffix = format!(".{OUTPUT_EXTENSION}");
        if suffix.eq_ignore_ascii_case(&document_suffix) {
            return Err(ConvertError::Config(format!(
                "data_file_suffix {suffix:?} would overwrite the metadata document"
            )));
        }
        Ok(self)
    }
}

/// Default settings file location, if the platform has a config directory.
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("datasetjson").join("config.json"))
}

/// Reads settings from `path`.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&content).map_err(|e| {
        ConvertError::Config(format!("Failed to parse {}: {e}", path.display()))
    })?;
    settings.validate()
}

/// Loads settings from `explicit`, else from the default location, else defaults.
///
/// An explicit file must exist; the default file is optional.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return load_settings_from(path);
    }
    match get_config_path() {
        Some(path) if path.is_file() => {
            tracing::debug!("Loading settings from {}", path.display());
            load_settings_from(&path)
        }
        _ => Ok(Settings::default()),
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
