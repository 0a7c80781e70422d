//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\songkeeper\config.toml
//! - macOS: ~/Library/Application Support/songkeeper/config.toml
//! - Linux: ~/.config/songkeeper/config.toml
//!
//! The config file is human-readable and editable. Command-line flags
//! override the music directory and database path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::DEFAULT_DB_NAME;
use crate::reference::ReferenceData;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library layout and scanning rules
    pub library: LibraryConfig,

    /// Reconciliation tuning
    pub reconcile: ReconcileConfig,

    /// Genre, dance and dance level tables
    pub reference: ReferenceData,
}

/// Library management settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the music library
    pub music_dir: Option<PathBuf>,

    /// Song database file
    pub database_path: PathBuf,

    /// Organization template for new and reorganized files
    pub org_path: String,

    /// Template describing the older layout that `%BYPASS%` values are read
    /// from
    pub bypass_org_path: Option<String>,

    /// Move new files into place while checking for new files or rebuilding
    pub auto_organize: bool,

    /// Directories (relative to the music directory) skipped while scanning
    pub legacy_dirs: Vec<String>,

    /// File name prefix marking a file for deletion
    pub delete_prefix: String,

    /// Extension suffix of original/backup copies
    pub backup_suffix: String,

    /// Extensions that are never audio
    pub non_audio_extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_dir: None,
            database_path: PathBuf::from(DEFAULT_DB_NAME),
            org_path: "{%DANCE%/}{%ALBUMARTIST%/}{%ALBUM%/}{%TRACKNUMBER0% - }{%TITLE%}"
                .to_string(),
            bypass_org_path: None,
            auto_organize: false,
            legacy_dirs: Vec::new(),
            delete_prefix: "delete-".to_string(),
            backup_suffix: "original".to_string(),
            non_audio_extensions: [
                "jpg", "jpeg", "png", "gif", "bmp", "ico", "svg", "bak", "tmp", "txt", "nfo",
                "log", "cue", "m3u", "pdf", "ini", "db",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Reconciliation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Pending jobs held in memory before enumeration pauses
    pub queue_limit: usize,

    /// Candidates classified per engine tick
    pub filename_batch: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            queue_limit: 100,
            filename_batch: 20,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("songkeeper"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!(target: "config", "Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from `path`, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!(target: "config", "No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!(target: "config", "Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!(target: "config", "Failed to parse config file {:?}: {}", path, e);
                tracing::warn!(target: "config", "Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!(target: "config", "Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to `path`.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", "Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
