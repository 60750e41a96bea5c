//! Configuration management for the manga tagger.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    pub data: DataConfig,

    /// Database settings
    pub database: DatabaseConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Intake and library directories
    pub library: LibraryConfig,

    /// Processing mode switches and limits
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// External catalog settings
    #[serde(default)]
    pub catalogs: CatalogsConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (relative to data directory or absolute)
    pub path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Intake and library locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directory new chapter archives arrive in
    pub intake_dir: String,

    /// Directory tagged chapters are moved into
    pub library_dir: String,

    /// Library for chapters whose metadata came from an adult catalog
    #[serde(default)]
    pub adult_library_dir: Option<String>,
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Rename chapters into the library
    pub rename_file: bool,

    /// Persist newly resolved series metadata
    pub database_insert: bool,

    /// Embed ComicInfo.xml into each chapter archive
    pub write_comicinfo: bool,

    /// Maximum number of chapters processed concurrently
    pub max_concurrent_files: usize,

    /// Path length at which the NHentai partial-title workaround kicks in
    pub path_length_limit: usize,
}

/// Catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogsConfig {
    pub anilist: EndpointConfig,
    pub mangaupdates: EndpointConfig,
    pub mal: EndpointConfig,
    pub fakku: EndpointConfig,
    pub nhentai: EndpointConfig,

    /// Maximum retries for failed requests
    pub max_retries: u32,

    /// Retry delay in milliseconds (doubled per attempt)
    pub retry_delay_ms: u64,

    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
}

/// One catalog endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the catalog
    pub base_url: String,

    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: f64,

    /// Maximum requests per minute
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            requests_per_minute: 30,
        }
    }
}

impl EndpointConfig {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            rename_file: true,
            database_insert: true,
            write_comicinfo: true,
            max_concurrent_files: 4,
            path_length_limit: 259,
        }
    }
}

impl Default for CatalogsConfig {
    fn default() -> Self {
        Self {
            anilist: EndpointConfig::new("https://graphql.anilist.co"),
            mangaupdates: EndpointConfig::new("https://api.mangaupdates.com/v1"),
            mal: EndpointConfig::new("https://api.jikan.moe/v4"),
            fakku: EndpointConfig::new("https://www.fakku.net"),
            nhentai: EndpointConfig::new("https://nhentai.net"),
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                root_dir: "data".to_string(),
            },
            database: DatabaseConfig {
                path: "manga_tagger.db".to_string(),
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: true,
                json_format: false,
            },
            library: LibraryConfig {
                intake_dir: "downloads".to_string(),
                library_dir: "library".to_string(),
                adult_library_dir: None,
            },
            processing: ProcessingConfig::default(),
            catalogs: CatalogsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the database file
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database.path)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    /// Directory new chapters arrive in
    pub fn intake_dir(&self) -> PathBuf {
        PathBuf::from(&self.library.intake_dir)
    }

    /// Directory tagged chapters are moved into
    pub fn library_dir(&self) -> PathBuf {
        PathBuf::from(&self.library.library_dir)
    }

    /// Adult library directory, if configured
    pub fn adult_library_dir(&self) -> Option<PathBuf> {
        self.library.adult_library_dir.as_ref().map(PathBuf::from)
    }

    /// Parse the configured log level, falling back to INFO
    pub fn log_level(&self) -> tracing::Level {
        self.logging
            .default_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }

    /// Resolve a path relative to the data directory
    fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.root_dir, "data");
        assert_eq!(config.database.path, "manga_tagger.db");
        assert_eq!(config.catalogs.mal.rate_limit.requests_per_second, 2.0);
        assert_eq!(config.catalogs.mal.rate_limit.requests_per_minute, 30);
        assert_eq!(config.processing.path_length_limit, 259);
        assert!(config.processing.rename_file);
        assert!(config.library.adult_library_dir.is_none());
    }

    #[test]
    fn test_save_and_load_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.library.adult_library_dir = Some("/srv/adult".to_string());
        original_config.save(&config_path)?;

        assert!(config_path.exists());

        let loaded_config = Config::from_file(&config_path)?;
        assert_eq!(loaded_config.data.root_dir, original_config.data.root_dir);
        assert_eq!(
            loaded_config.catalogs.anilist.base_url,
            original_config.catalogs.anilist.base_url
        );
        assert_eq!(loaded_config.adult_library_dir(), Some(PathBuf::from("/srv/adult")));

        Ok(())
    }

    #[test]
    fn test_missing_sections_use_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[data]
root_dir = "/var/lib/tagger"

[database]
path = "tagger.db"

[logging]
log_dir = "logs"
default_level = "debug"
console = true
file = false
json_format = false

[library]
intake_dir = "/downloads"
library_dir = "/manga"
"#,
        )?;

        let config = Config::from_file(&config_path)?;
        assert_eq!(config.processing.max_concurrent_files, 4);
        assert_eq!(config.catalogs.nhentai.base_url, "https://nhentai.net");
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/tagger/tagger.db"));

        Ok(())
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        // Should return default config without error
        assert_eq!(config.data.root_dir, "data");
    }

    #[test]
    fn test_path_resolution() {
        let config = Config::default();

        let db_path = config.database_path();
        assert!(db_path.ends_with("data/manga_tagger.db"));

        let log_dir = config.log_dir();
        assert!(log_dir.ends_with("data/logs"));

        assert_eq!(config.library_dir(), PathBuf::from("library"));
    }
}
