use crate::batch::Mode;
use crate::error::ConfigError;
use crate::export::{DEFAULT_EXPORT_PATH, DEFAULT_SHEET_NAME, ExportFormat};
use crate::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use toml_edit::{DocumentMut, value};

pub const DEFAULT_CONFIG_PATH: &str = "invoice-extract.toml";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub processing: ProcessingConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub path: PathBuf,
    pub sheet_name: String,
    pub format: ExportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_EXPORT_PATH),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            format: ExportFormat::Xlsx,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Keeps the last four characters, but only when more than four are hidden.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(io_error(path))?;
        Ok(toml::from_str(&content)?)
    }

    /// An explicit path must exist; the default path is optional.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_error(path))
    }

    /// Flag beats environment beats file.
    /// A blank source is skipped rather than shadowing the next one.
    pub fn resolve_api_key(&self, flag: Option<String>, env: Option<String>) -> Option<String> {
        let usable = |key: Option<String>| key.filter(|k| !k.trim().is_empty());
        usable(flag)
            .or_else(|| usable(env))
            .or_else(|| usable(self.gemini.api_key.clone()))
    }

    /// Copy safe to print.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if let Some(key) = &self.gemini.api_key {
            masked.gemini.api_key = Some(mask_key(key));
        }
        masked
    }

    /// Set `section.key` in an existing file, keeping its comments and layout.
    pub fn set_value(path: impl AsRef<Path>, key: &str, raw: &str) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let (section, field) = key
            .split_once('.')
            .filter(|(s, f)| !s.is_empty() && !f.is_empty() && !f.contains('.'))
            .ok_or_else(|| ConfigError::Key(key.to_string()))?;

        let content = fs::read_to_string(path).map_err(io_error(path))?;
        let mut doc = content.parse::<DocumentMut>()?;

        let new_value = raw
            .parse::<toml_edit::Value>()
            .unwrap_or_else(|_| toml_edit::Value::from(raw));
        if !doc.contains_key(section) {
            doc[section] = toml_edit::table();
        }
        doc[section][field] = value(new_value);

        let updated = doc.to_string();
        // reject edits that no longer describe a valid config
        toml::from_str::<Config>(&updated)?;

        fs::write(path, updated).map_err(io_error(path))
    }
}
