//! Configuration management for scribble.
//!
//! Loads configuration from ${SCRIBBLE_HOME}/config.toml with sensible defaults.
//! The top-level `model`, `api_key` and `memory` fields are the user
//! preferences edited through `scribble settings`; every write goes straight
//! to disk so the next request sees it.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models;
use crate::providers::shared::resolve_api_key;

/// Environment variable consulted when no `api_key` is configured.
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// This ensures new comments/sections from the template are always present,
/// while preserving user's customized values.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for scribble configuration and data files.
    //!
    //! SCRIBBLE_HOME resolution order:
    //! 1. SCRIBBLE_HOME environment variable (if set)
    //! 2. ~/.config/scribble (default)
    //! 3. ./.scribble when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the scribble home directory.
    pub fn scribble_home() -> PathBuf {
        if let Ok(home) = std::env::var("SCRIBBLE_HOME")
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".scribble"),
            |h| h.join(".config").join("scribble"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        scribble_home().join("config.toml")
    }

    /// Returns the path to the persisted sessions file.
    pub fn sessions_path() -> PathBuf {
        scribble_home().join("sessions.json")
    }

    /// Returns the directory that receives log files.
    pub fn logs_dir() -> PathBuf {
        scribble_home().join("logs")
    }
}

/// Gemini provider overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSection {
    /// Custom API endpoint (the `GEMINI_BASE_URL` env var takes precedence).
    pub base_url: Option<String>,
}

/// Presence status poll configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Discord user id to look up. No poll runs without one.
    pub user_id: Option<String>,
    /// Custom Lanyard endpoint.
    pub base_url: Option<String>,
    /// Seconds between polls.
    pub interval_secs: u64,
}

impl StatusConfig {
    const DEFAULT_INTERVAL_SECS: u64 = 30;

    /// Poll interval, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Configured user id, if non-blank.
    pub fn effective_user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            base_url: None,
            interval_secs: Self::DEFAULT_INTERVAL_SECS,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Selected Gemini model id
    pub model: String,

    /// Gemini API key
    pub api_key: Option<String>,

    /// Free-text memory note included in every text-mode request
    pub memory: String,

    #[serde(default)]
    pub gemini: GeminiSection,

    #[serde(default)]
    pub status: StatusConfig,
}

/// Preferences read synchronously before each generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub api_key: Option<String>,
    pub model: String,
    pub memory: String,
}

impl Preferences {
    /// Returns the credential if it is present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// A single preference field editable through the settings surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceField {
    ApiKey,
    Model,
    Memory,
}

impl PreferenceField {
    /// Key of the field in config.toml.
    pub fn key(self) -> &'static str {
        match self {
            PreferenceField::ApiKey => "api_key",
            PreferenceField::Model => "model",
            PreferenceField::Memory => "memory",
        }
    }
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    ///
    /// Returns defaults if the file doesn't exist. A file that fails to parse
    /// is treated as absent.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring malformed config");
                Ok(Config::default())
            }
        }
    }

    /// Snapshot of the user preferences, resolving the credential from the
    /// environment when the config has none.
    pub fn preferences(&self) -> Preferences {
        let model = self.model.trim();
        Preferences {
            api_key: resolve_api_key(self.api_key.as_deref(), API_KEY_ENV_VAR),
            model: if model.is_empty() {
                models::DEFAULT_MODEL.to_string()
            } else {
                model.to_string()
            },
            memory: self.memory.clone(),
        }
    }

    /// Returns the configured Gemini base URL, if any.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.gemini
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Saves a single preference field to the default config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_field(field: PreferenceField, value: &str) -> Result<()> {
        Self::save_field_to(&paths::config_path(), field, value)
    }

    /// Saves a single preference field to a specific config file path.
    ///
    /// Creates the file with default template if it doesn't exist.
    /// If the file exists, merges user values into the latest template.
    /// Writing an empty credential removes the key entirely.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or written.
    pub fn save_field_to(path: &Path, field: PreferenceField, value: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value as toml_value};

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "replacing malformed config");
                default_config_template().to_string()
            })
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        match field {
            PreferenceField::ApiKey if value.trim().is_empty() => {
                doc.remove(field.key());
            }
            PreferenceField::ApiKey | PreferenceField::Model => {
                doc[field.key()] = toml_value(value.trim());
            }
            PreferenceField::Memory => {
                doc[field.key()] = toml_value(value);
            }
        }

        Self::write_config(path, &doc.to_string())
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: models::DEFAULT_MODEL.to_string(),
            api_key: None,
            memory: String::new(),
            gemini: GeminiSection::default(),
            status: StatusConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.model, "gemini-3-flash-preview");
        assert_eq!(config.api_key, None);
        assert!(config.memory.is_empty());
        assert_eq!(config.status.interval_secs, 30);
    }

    #[test]
    fn test_load_malformed_file_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "model = [unterminated").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.model, "gemini-3-flash-preview");
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "memory = \"likes blue pencils\"\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.model, "gemini-3-flash-preview");
        assert_eq!(config.memory, "likes blue pencils");
    }

    #[test]
    fn test_save_field_creates_file_and_is_visible_on_next_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.toml");

        Config::save_field_to(&config_path, PreferenceField::ApiKey, "AIza-test").unwrap();
        Config::save_field_to(&config_path, PreferenceField::Model, "gemini-3-pro-preview")
            .unwrap();
        Config::save_field_to(&config_path, PreferenceField::Memory, "my name is alex").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("AIza-test"));
        assert_eq!(config.model, "gemini-3-pro-preview");
        assert_eq!(config.memory, "my name is alex");
    }

    #[test]
    fn test_save_field_preserves_other_values_and_comments() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "memory = \"keep me\"\n[status]\nuser_id = \"42\"\n",
        )
        .unwrap();

        Config::save_field_to(&config_path, PreferenceField::Model, "gemini-2.5-flash-image")
            .unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("# Gemini API key."));
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.memory, "keep me");
        assert_eq!(config.status.user_id.as_deref(), Some("42"));
        assert_eq!(config.model, "gemini-2.5-flash-image");
    }

    #[test]
    fn test_blank_api_key_removes_credential() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        Config::save_field_to(&config_path, PreferenceField::ApiKey, "AIza-test").unwrap();
        Config::save_field_to(&config_path, PreferenceField::ApiKey, "  ").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        assert!(config_path.exists());
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.model, "gemini-3-flash-preview");
        assert!(Config::init(&config_path).is_err());
    }

    #[test]
    fn test_preferences_fall_back_to_default_model_when_blank() {
        let config = Config {
            model: "  ".to_string(),
            api_key: Some("key".to_string()),
            ..Config::default()
        };

        let prefs = config.preferences();
        assert_eq!(prefs.model, "gemini-3-flash-preview");
        assert_eq!(prefs.credential(), Some("key"));
    }

    #[test]
    fn test_blank_credential_is_not_a_credential() {
        let prefs = Preferences {
            api_key: Some("   ".to_string()),
            ..Preferences::default()
        };
        assert_eq!(prefs.credential(), None);
    }
}
