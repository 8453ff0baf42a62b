//! Settings resolution and artist-name preferences
//!
//! Provides multi-tier resolution with CLI → ENV → TOML → default priority
//! on top of the bootstrap [`TomlConfig`], plus the user-editable table of
//! preferred romanizations.

use crate::services::musicbrainz_client::MusicBrainzConfig;
use omym_common::config::{
    default_database_path, default_preferences_path, parse_env_bool, resolve_path_setting,
    write_atomic, TomlConfig,
};
use omym_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const BASE_PATH_ENV: &str = "OMYM_BASE_PATH";
pub const DATABASE_PATH_ENV: &str = "OMYM_DATABASE_PATH";
pub const USE_MB_ROMANIZATION_ENV: &str = "OMYM_USE_MB_ROMANIZATION";
pub const MB_APP_NAME_ENV: &str = "OMYM_MB_APP_NAME";
pub const MB_APP_VERSION_ENV: &str = "OMYM_MB_APP_VERSION";
pub const MB_CONTACT_ENV: &str = "OMYM_MB_CONTACT";
pub const PREFERENCES_PATH_ENV: &str = "OMYM_ARTIST_NAME_PREFERENCES_PATH";

pub const DEFAULT_UNPROCESSED_DIR_NAME: &str = "unprocessed";
pub const DEFAULT_UNPROCESSED_PREVIEW_LIMIT: usize = 20;
const DEFAULT_MB_APP_NAME: &str = "omym";

/// Effective settings for one process
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_path: Option<PathBuf>,
    pub database_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub use_mb_romanization: bool,
    pub musicbrainz: MusicBrainzConfig,
    pub unprocessed_dir_name: String,
    pub unprocessed_preview_limit: usize,
}

impl Settings {
    /// Resolve every setting from CLI overrides, environment and TOML
    pub fn resolve(toml: &TomlConfig, database_override: Option<&Path>) -> Self {
        let database_path = resolve_path_setting(
            database_override,
            DATABASE_PATH_ENV,
            toml.database_path.as_deref(),
            default_database_path,
        );

        let base_path = pick_source(
            "base_path",
            env_string(BASE_PATH_ENV).map(PathBuf::from),
            toml.base_path.clone(),
        );

        let use_mb_romanization = pick_source(
            "use_mb_romanization",
            env_string(USE_MB_ROMANIZATION_ENV).and_then(|v| parse_env_bool(&v)),
            toml.use_mb_romanization,
        )
        .unwrap_or(true);

        let musicbrainz = MusicBrainzConfig {
            app_name: pick_source("mb_app_name", env_string(MB_APP_NAME_ENV), toml.mb_app_name.clone())
                .unwrap_or_else(|| DEFAULT_MB_APP_NAME.to_string()),
            app_version: pick_source(
                "mb_app_version",
                env_string(MB_APP_VERSION_ENV),
                toml.mb_app_version.clone(),
            )
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            contact: pick_source("mb_contact", env_string(MB_CONTACT_ENV), toml.mb_contact.clone())
                .unwrap_or_default(),
        };

        let unprocessed_dir_name = toml
            .unprocessed_dir_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_UNPROCESSED_DIR_NAME)
            .to_string();

        Self {
            base_path,
            database_path,
            log_file: toml.log_file.clone(),
            log_level: toml.logging.level.clone(),
            use_mb_romanization,
            musicbrainz,
            unprocessed_dir_name,
            unprocessed_preview_limit: toml
                .unprocessed_preview_limit
                .unwrap_or(DEFAULT_UNPROCESSED_PREVIEW_LIMIT),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Environment over TOML, warning when both are set
fn pick_source<T>(setting: &str, env_value: Option<T>, toml_value: Option<T>) -> Option<T> {
    match (env_value, toml_value) {
        (Some(env_value), Some(_)) => {
            warn!(
                setting,
                "Setting found in environment and TOML config. Using environment (higher priority)."
            );
            Some(env_value)
        }
        (Some(env_value), None) => Some(env_value),
        (None, toml_value) => toml_value,
    }
}

/// Preferences file location (`OMYM_ARTIST_NAME_PREFERENCES_PATH` or platform default)
pub fn preferences_path() -> Result<PathBuf> {
    match env_string(PREFERENCES_PATH_ENV) {
        Some(path) => Ok(PathBuf::from(path)),
        None => default_preferences_path(),
    }
}

const PREFERENCES_VERSION: u32 = 1;

const PREFERENCES_TEMPLATE: &str = r#"# Artist name preferences
#
# Map an artist name exactly as tagged to the name omym should use.
# Matching ignores case. Blank values are placeholders that omym adds for
# non-Latin names it has seen; fill them in to override romanization.
metadata_version = 1

[defaults]

[preferences]
# "宇多田ヒカル" = "Hikaru Utada"
"#;

const PREFERENCES_HEADER: &str = "# Artist name preferences (blank values are placeholders)\n";

#[derive(Debug, Default, Deserialize, Serialize)]
struct PreferencesDocument {
    #[serde(default = "default_preferences_version")]
    metadata_version: u32,
    #[serde(default)]
    defaults: toml::Table,
    #[serde(default)]
    preferences: BTreeMap<String, String>,
}

fn default_preferences_version() -> u32 {
    PREFERENCES_VERSION
}

/// User table of preferred artist names
#[derive(Debug, Clone, Default)]
pub struct ArtistNamePreferences {
    path: Option<PathBuf>,
    defaults: toml::Table,
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
    dirty: bool,
}

fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ArtistNamePreferences {
    /// Load preferences from `path`, creating the file from a template when missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            write_atomic(path, PREFERENCES_TEMPLATE)?;
            info!(path = %path.display(), "Created artist name preferences file");
        }
        Self::load(path)
    }

    /// Load and validate preferences from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read preferences failed ({}): {}", path.display(), e))
        })?;
        let mut preferences = Self::parse(&content)
            .map_err(|e| Error::Config(format!("{} ({})", e, path.display())))?;
        preferences.path = Some(path.to_path_buf());

        debug!(path = %path.display(), entries = preferences.entries.len(), "Loaded artist name preferences");
        Ok(preferences)
    }

    /// Parse a preferences document
    pub fn parse(content: &str) -> Result<Self> {
        let document: PreferencesDocument = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse preferences failed: {}", e)))?;

        if document.metadata_version != PREFERENCES_VERSION {
            return Err(Error::Config(format!(
                "Unsupported preferences metadata_version {}",
                document.metadata_version
            )));
        }

        let mut preferences = Self {
            defaults: document.defaults,
            ..Self::default()
        };

        for (name, value) in document.preferences {
            let key = normalize_key(&name);
            if key.is_empty() {
                return Err(Error::Config("Empty artist name in preferences".to_string()));
            }
            if preferences.index.contains_key(&key) {
                return Err(Error::Config(format!(
                    "Duplicate artist name in preferences (case-insensitive): {}",
                    name.trim()
                )));
            }
            preferences.index.insert(key, preferences.entries.len());
            preferences.entries.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(preferences)
    }

    /// File the preferences are saved to
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Configured entries in file order (placeholders included)
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Preferred name for `name`, ignoring case and placeholders
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let index = self.index.get(&normalize_key(name))?;
        let value = self.entries[*index].1.as_str();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// Set the preferred name for `name`
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let key = normalize_key(name);
        if key.is_empty() {
            return Err(Error::InvalidInput("Artist name must not be empty".to_string()));
        }

        let value = value.trim().to_string();
        match self.index.get(&key) {
            Some(&index) => self.entries[index].1 = value,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((name.trim().to_string(), value));
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Add a blank entry for `name` unless one exists; true when added
    pub fn ensure_placeholder(&mut self, name: &str) -> bool {
        let key = normalize_key(name);
        if key.is_empty() || self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push((name.trim().to_string(), String::new()));
        self.dirty = true;
        true
    }

    /// True when entries changed since loading or saving
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Render as a TOML document
    pub fn to_toml_string(&self) -> Result<String> {
        let document = PreferencesDocument {
            metadata_version: PREFERENCES_VERSION,
            defaults: self.defaults.clone(),
            preferences: self.entries.iter().cloned().collect(),
        };
        let body = toml::to_string_pretty(&document)
            .map_err(|e| Error::Config(format!("Serialize preferences failed: {}", e)))?;
        Ok(format!("{}{}", PREFERENCES_HEADER, body))
    }

    /// Write the preferences back when they changed and have a file
    pub fn save_if_changed(&mut self) -> Result<bool> {
        let Some(path) = self.path.clone() else {
            return Ok(false);
        };
        if !self.dirty {
            return Ok(false);
        }

        write_atomic(&path, &self.to_toml_string()?)?;
        self.dirty = false;
        info!(path = %path.display(), entries = self.entries.len(), "Saved artist name preferences");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ALL_ENV: [&str; 6] = [
        BASE_PATH_ENV,
        DATABASE_PATH_ENV,
        USE_MB_ROMANIZATION_ENV,
        MB_APP_NAME_ENV,
        MB_APP_VERSION_ENV,
        MB_CONTACT_ENV,
    ];

    fn clear_env() {
        for name in ALL_ENV {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_sources() {
        clear_env();
        let settings = Settings::resolve(&TomlConfig::default(), None);

        assert!(settings.use_mb_romanization);
        assert_eq!(settings.musicbrainz.app_name, "omym");
        assert_eq!(settings.musicbrainz.app_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(settings.musicbrainz.contact, "");
        assert_eq!(settings.unprocessed_dir_name, "unprocessed");
        assert_eq!(settings.unprocessed_preview_limit, 20);
        assert_eq!(settings.base_path, None);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_toml() {
        clear_env();
        let toml = TomlConfig {
            use_mb_romanization: Some(true),
            mb_contact: Some("toml@example.com".to_string()),
            database_path: Some(PathBuf::from("/toml/omym.db")),
            ..TomlConfig::default()
        };
        std::env::set_var(USE_MB_ROMANIZATION_ENV, "off");
        std::env::set_var(MB_CONTACT_ENV, "env@example.com");

        let settings = Settings::resolve(&toml, None);
        assert!(!settings.use_mb_romanization);
        assert_eq!(settings.musicbrainz.contact, "env@example.com");
        assert_eq!(settings.database_path, PathBuf::from("/toml/omym.db"));

        // Unparseable booleans fall through to TOML
        std::env::set_var(USE_MB_ROMANIZATION_ENV, "sometimes");
        assert!(Settings::resolve(&toml, None).use_mb_romanization);

        // CLI wins over everything
        std::env::set_var(DATABASE_PATH_ENV, "/env/omym.db");
        let settings = Settings::resolve(&toml, Some(Path::new("/cli/omym.db")));
        assert_eq!(settings.database_path, PathBuf::from("/cli/omym.db"));

        clear_env();
    }

    #[test]
    fn test_preferences_resolve_case_insensitively() {
        let preferences = ArtistNamePreferences::parse(
            r#"
            metadata_version = 1
            [preferences]
            "宇多田ヒカル" = "Hikaru Utada"
            "The Band" = "Band, The"
            "ヨルシカ" = ""
            "#,
        )
        .unwrap();

        assert_eq!(preferences.resolve("宇多田ヒカル"), Some("Hikaru Utada"));
        assert_eq!(preferences.resolve("  the band "), Some("Band, The"));
        assert_eq!(preferences.resolve("ヨルシカ"), None);
        assert_eq!(preferences.resolve("Unknown"), None);
    }

    #[test]
    fn test_preferences_validation() {
        let duplicate = ArtistNamePreferences::parse(
            "metadata_version = 1\n[preferences]\n\"Queen\" = \"A\"\n\"queen\" = \"B\"\n",
        );
        assert!(matches!(duplicate, Err(Error::Config(_))));

        let empty = ArtistNamePreferences::parse("[preferences]\n\" \" = \"A\"\n");
        assert!(matches!(empty, Err(Error::Config(_))));

        let version = ArtistNamePreferences::parse("metadata_version = 7\n");
        assert!(matches!(version, Err(Error::Config(_))));
    }

    #[test]
    fn test_placeholders_are_saved_and_reloaded() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs").join("artist_name_preferences.toml");

        let mut preferences = ArtistNamePreferences::load_or_create(&path).unwrap();
        assert!(preferences.entries().is_empty());
        assert!(!preferences.save_if_changed().unwrap());

        assert!(preferences.ensure_placeholder("ヨルシカ"));
        assert!(!preferences.ensure_placeholder("ヨルシカ"));
        preferences.set("Queen", "QUEEN").unwrap();
        assert!(preferences.save_if_changed().unwrap());

        let reloaded = ArtistNamePreferences::load(&path).unwrap();
        assert_eq!(reloaded.entries().len(), 2);
        assert_eq!(reloaded.resolve("queen"), Some("QUEEN"));
        assert_eq!(reloaded.resolve("ヨルシカ"), None);
        assert!(!reloaded.is_dirty());
    }
}
