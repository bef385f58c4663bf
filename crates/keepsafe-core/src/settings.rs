//! Application settings management
//!
//! Stores non-sensitive configuration in a plain JSON file next to the
//! database. Settings are readable before any master password is entered.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::crypto::{HashParams, KdfParams};
use crate::dictionary::{DictionaryConfig, DEFAULT_MAX_LENGTH};
use crate::error::{Result, VaultError};

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_DATABASE_FILE: &str = "keepsafe.db";

/// Common-password dictionary configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DictionarySettings {
    /// Word list; no dictionary check when unset
    pub source: Option<PathBuf>,
    /// Cache file, defaults to the source with a `.ws` extension
    pub cache: Option<PathBuf>,
    /// Longest indexed entry, in characters
    pub max_length: usize,
}

impl Default for DictionarySettings {
    fn default() -> Self {
        Self {
            source: None,
            cache: None,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl DictionarySettings {
    /// Index configuration with relative paths resolved against `base`
    pub fn config(&self, base: &Path) -> Option<DictionaryConfig> {
        let source = base.join(self.source.as_ref()?);
        let mut config = DictionaryConfig::new(source).with_max_length(self.max_length);
        if let Some(cache) = &self.cache {
            config = config.with_cache(base.join(cache));
        }
        Some(config)
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    /// Database file, relative to the storage directory
    pub database_file: PathBuf,
    /// Field encryption key derivation
    pub kdf: KdfParams,
    /// Master password verification hash
    pub master_hash: HashParams,
    pub dictionary: DictionarySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            database_file: PathBuf::from(DEFAULT_DATABASE_FILE),
            kdf: KdfParams::default(),
            master_hash: HashParams::default(),
            dictionary: DictionarySettings::default(),
        }
    }
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }
}

/// Default per-user data directory
pub fn default_storage_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "keepsafe", "keepsafe")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| VaultError::Storage("Could not determine data directory".to_string()))
}

/// Settings manager
#[derive(Debug)]
pub struct SettingsManager {
    storage_dir: PathBuf,
    settings_file: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Load settings from `storage_dir`, falling back to defaults
    pub fn new(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join(SETTINGS_FILE);
        let settings = Self::load_from_file(&settings_file).unwrap_or_else(|err| {
            warn!("Ignoring unreadable settings file {:?}: {}", settings_file, err);
            Settings::new()
        });

        Self {
            storage_dir: storage_dir.to_path_buf(),
            settings_file,
            settings,
        }
    }

    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Settings::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Absolute path of the credential database
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.settings.database_file)
    }

    /// Dictionary index configuration, if a word list is configured
    pub fn dictionary_config(&self) -> Option<DictionaryConfig> {
        self.settings.dictionary.config(&self.storage_dir)
    }

    /// Save settings to file
    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.settings)?;

        std::fs::create_dir_all(&self.storage_dir)?;
        let mut temp = NamedTempFile::new_in(&self.storage_dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.persist(&self.settings_file).map_err(|err| err.error)?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Replace settings and save
    pub fn update(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.save()
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&mut self) -> Result<()> {
        self.settings = Settings::default();

        if self.settings_file.exists() {
            std::fs::remove_file(&self.settings_file)?;
        }

        Ok(())
    }
}
