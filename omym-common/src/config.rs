//! Bootstrap configuration and default path resolution
//!
//! The TOML file is read once per process. Every key is optional; missing
//! keys fall back to built-in defaults so a fresh install works with an
//! empty (or absent) file.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`OMYM_*`)
//! 3. TOML configuration file
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name used under the platform config/data directories
pub const APP_DIR_NAME: &str = "omym";

/// Environment variable that points at an alternative config file
pub const CONFIG_PATH_ENV: &str = "OMYM_CONFIG_PATH";

/// Bootstrap configuration loaded from `config.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TomlConfig {
    /// Default library root used when `--target` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,

    /// Location of the SQLite state database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Optional log file (in addition to stderr)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Query MusicBrainz before falling back to local transliteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_mb_romanization: Option<bool>,

    /// Application name sent in the MusicBrainz User-Agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_app_name: Option<String>,

    /// Application version sent in the MusicBrainz User-Agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_app_version: Option<String>,

    /// Contact (mail or URL) sent in the MusicBrainz User-Agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_contact: Option<String>,

    /// Name of the quarantine folder created under an organized source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unprocessed_dir_name: Option<String>,

    /// How many quarantined files the summary lists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unprocessed_preview_limit: Option<usize>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "omym=info")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

const CONFIG_TEMPLATE: &str = r#"# omym configuration
#
# Every key is optional. Environment variables (OMYM_*) override values here.

# Library root used when --target is omitted
# base_path = "/path/to/Music"

# SQLite state database
# database_path = "/path/to/omym.db"

# Append logs to this file in addition to stderr
# log_file = "/path/to/omym.log"

# Look up romanized artist names on MusicBrainz
# use_mb_romanization = true
# mb_app_name = "omym"
# mb_app_version = "0.1.0"
# mb_contact = ""

# Folder (under the organized source) that receives files omym could not organize
# unprocessed_dir_name = "unprocessed"
# unprocessed_preview_limit = 20

[logging]
# level = "omym=info"
"#;

/// Default configuration file path for the platform
///
/// `OMYM_CONFIG_PATH` overrides the platform location.
pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME).join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Default artist-name preferences file path for the platform
pub fn default_preferences_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME).join("artist_name_preferences.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    if cfg!(target_os = "macos") {
        // ~/Library/Application Support/omym
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME).join("omym.db"))
            .unwrap_or_else(|| PathBuf::from("./omym_data/omym.db"))
    } else {
        // ~/.local/share/omym or %LOCALAPPDATA%\omym
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME).join("omym.db"))
            .unwrap_or_else(|| PathBuf::from("./omym_data/omym.db"))
    }
}

/// Load the TOML config at `path`, creating it from the template when missing
pub fn load_or_create_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, CONFIG_TEMPLATE)?;
        info!(path = %path.display(), "Created default configuration file");
    }

    load_toml_config(path)
}

/// Parse the TOML config at `path`
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Write `config` to `path` atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    write_atomic(path, &content)
}

/// Replace `path` with `content` without leaving a truncated file behind
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Path setting resolution following the documented priority order
///
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config value
/// 4. Compiled default (fallback)
pub fn resolve_path_setting(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
    default: impl FnOnce() -> PathBuf,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    // Priority 4: compiled default
    default()
}

/// Parse a boolean environment value (1/true/yes/on, 0/false/no/off)
///
/// Returns `None` for anything else so the next source is consulted.
pub fn parse_env_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_parse_env_bool() {
        assert_eq!(parse_env_bool("YES"), Some(true));
        assert_eq!(parse_env_bool(" on "), Some(true));
        assert_eq!(parse_env_bool("0"), Some(false));
        assert_eq!(parse_env_bool("Off"), Some(false));
        assert_eq!(parse_env_bool("maybe"), None);
        assert_eq!(parse_env_bool(""), None);
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: TomlConfig = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = load_or_create_toml_config(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = TomlConfig {
            base_path: Some(PathBuf::from("/music")),
            use_mb_romanization: Some(false),
            mb_contact: Some("me@example.com".to_string()),
            unprocessed_preview_limit: Some(5),
            ..Default::default()
        };
        write_toml_config(&config, &path).unwrap();

        let loaded = load_toml_config(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "base_path = [").unwrap();

        let err = load_toml_config(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    #[serial]
    fn test_resolve_path_setting_priority() {
        let env_name = "OMYM_TEST_RESOLVE_PATH";
        std::env::set_var(env_name, "/from/env");

        let cli = PathBuf::from("/from/cli");
        let toml_value = PathBuf::from("/from/toml");

        let resolved = resolve_path_setting(
            Some(&cli),
            env_name,
            Some(&toml_value),
            || PathBuf::from("/default"),
        );
        assert_eq!(resolved, cli);

        let resolved =
            resolve_path_setting(None, env_name, Some(&toml_value), || PathBuf::from("/default"));
        assert_eq!(resolved, PathBuf::from("/from/env"));

        std::env::remove_var(env_name);

        let resolved =
            resolve_path_setting(None, env_name, Some(&toml_value), || PathBuf::from("/default"));
        assert_eq!(resolved, toml_value);

        let resolved = resolve_path_setting(None, env_name, None, || PathBuf::from("/default"));
        assert_eq!(resolved, PathBuf::from("/default"));
    }
}
