//! # Sync Configuration
//!
//! Configuration management for the sync coordinator.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CONNECT_REGION_CAPACITY=20                                         │
//! │     CONNECT_API_URL=https://connect.ifttt.com/v2                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/connect/sync.toml (Linux)                                │
//! │     ~/Library/Application Support/com.ifttt.connect/sync.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     20 regions, 25s background budget, 30s fetch timeout               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [sync]
//! region_capacity = 20
//! background_time_budget_secs = 25
//! fetch_timeout_secs = 30
//! api_base_url = "https://connect.ifttt.com/v2"
//!
//! [storage]
//! database_path = "/var/lib/connect/connect.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use connect_core::DEFAULT_REGION_CAPACITY;

use crate::error::{SyncError, SyncResult};

const DATABASE_FILE_NAME: &str = "connect.db";

// =============================================================================
// Sync Settings
// =============================================================================

/// Coordinator behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Number of geofences the OS lets the app register.
    #[serde(default = "default_region_capacity")]
    pub region_capacity: usize,

    /// How long background entry points may run before they must call back.
    #[serde(default = "default_background_budget")]
    pub background_time_budget_secs: u64,

    /// Upper bound on a single connection fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Base URL of the connection API, handed to network adapters.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_region_capacity() -> usize {
    DEFAULT_REGION_CAPACITY
}

fn default_background_budget() -> u64 {
    25
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_api_base_url() -> String {
    "https://connect.ifttt.com/v2".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            region_capacity: default_region_capacity(),
            background_time_budget_secs: default_background_budget(),
            fetch_timeout_secs: default_fetch_timeout(),
            api_base_url: default_api_base_url(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the local store lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Coordinator behaviour settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Local store settings.
    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document and validates it. No environment overrides.
    pub fn from_toml(contents: &str) -> SyncResult<Self> {
        let config: SyncConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.region_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "region_capacity must be greater than 0".into(),
            ));
        }

        if self.sync.background_time_budget_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "background_time_budget_secs must be greater than 0".into(),
            ));
        }

        if self.sync.fetch_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "fetch_timeout_secs must be greater than 0".into(),
            ));
        }

        let url = Url::parse(&self.sync.api_base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.sync.api_base_url
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("CONNECT_REGION_CAPACITY") {
            match value.parse::<usize>() {
                Ok(capacity) => {
                    debug!(capacity, "Overriding region capacity from environment");
                    self.sync.region_capacity = capacity;
                }
                Err(_) => warn!(value = %value, "Ignoring invalid CONNECT_REGION_CAPACITY"),
            }
        }

        if let Ok(value) = std::env::var("CONNECT_BACKGROUND_BUDGET_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => self.sync.background_time_budget_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid CONNECT_BACKGROUND_BUDGET_SECS"),
            }
        }

        if let Ok(value) = std::env::var("CONNECT_FETCH_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => self.sync.fetch_timeout_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid CONNECT_FETCH_TIMEOUT_SECS"),
            }
        }

        if let Ok(url) = std::env::var("CONNECT_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.sync.api_base_url = url;
        }

        if let Ok(path) = std::env::var("CONNECT_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ifttt", "connect")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the database path: configured, else the platform data dir.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("com", "ifttt", "connect")
                .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
        })
    }

    /// Returns the geofence capacity.
    pub fn region_capacity(&self) -> usize {
        self.sync.region_capacity
    }

    /// Returns the background time budget.
    pub fn background_time_budget(&self) -> Duration {
        Duration::from_secs(self.sync.background_time_budget_secs)
    }

    /// Returns the per-fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.fetch_timeout_secs)
    }

    /// Returns the API base URL.
    pub fn api_base_url(&self) -> SyncResult<Url> {
        Ok(Url::parse(&self.sync.api_base_url)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.region_capacity(), 20);
        assert_eq!(config.background_time_budget(), Duration::from_secs(25));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.sync.region_capacity = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        config.sync.region_capacity = 5;
        config.sync.background_time_budget_secs = 0;
        assert!(config.validate().is_err());

        config.sync.background_time_budget_secs = 10;
        config.sync.api_base_url = "ws://example.com".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.sync.api_base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.sync.api_base_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            [sync]
            region_capacity = 5

            [storage]
            database_path = "/tmp/connect-test.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.region_capacity(), 5);
        assert_eq!(config.sync.fetch_timeout_secs, 30);
        assert_eq!(
            config.database_path(),
            Some(PathBuf::from("/tmp/connect-test.db"))
        );
    }

    #[test]
    fn test_invalid_toml() {
        let err = SyncConfig::from_toml("[sync]\nregion_capacity = \"many\"").unwrap_err();
        assert!(matches!(err, SyncError::ConfigLoadFailed(_)));
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("region_capacity = 20"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("connect-sync-{}.toml", uuid::Uuid::new_v4()));
        let mut config = SyncConfig::default();
        config.sync.region_capacity = 7;

        config.save(Some(path.clone())).unwrap();
        let loaded = SyncConfig::from_toml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.region_capacity(), 7);
    }
}
