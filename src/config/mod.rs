//! # Configuration
//!
//! Mercator reads a single TOML file. Every section and field has a default, so
//! an empty file is a valid configuration.
//!
//! ## Sections
//!
//! - [`GameConfig`] - RNG seed, starting wallet, autosave behaviour
//! - [`StorageConfig`] - where the sled save database lives
//! - [`ContentConfig`] - optional JSON quest/achievement files replacing the built-in seeds
//! - [`ContractConfig`] - contract pool size and refresh cadence
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mercator::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("mercator.toml").await?;
//!     let config = Config::load("mercator.toml").await?;
//!     config.validate()?;
//!     println!("saves live in {}", config.storage.data_dir);
//!     Ok(())
//! }
//! ```
//!
//! ## File format
//!
//! ```toml
//! [game]
//! seed = 42
//! starting_gold = 250
//! autosave_on_travel = true
//!
//! [storage]
//! data_dir = "./data/saves"
//!
//! [content]
//! quests_file = "data/seeds/quests.json"
//!
//! [contracts]
//! pool_size = 4
//! refresh_days = 1
//!
//! [logging]
//! level = "info"
//! file = "mercator.log"
//! ```

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::sim::contract::DEFAULT_POOL_SIZE;
use crate::sim::session::SessionOptions;

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub starting_gold: i64,
    /// Write the autosave slot every time the player changes location.
    pub autosave_on_travel: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: None,
            starting_gold: 250,
            autosave_on_travel: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/saves".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quests_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievements_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContractConfig {
    pub pool_size: usize,
    /// Regenerate the pool on every Nth day tick.
    pub refresh_days: u64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            refresh_days: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub game: GameConfig,
    pub storage: StorageConfig,
    pub content: ContentConfig,
    pub contracts: ContractConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.contracts.pool_size == 0 {
            bail!("contracts.pool_size must be at least 1");
        }
        if self.contracts.refresh_days == 0 {
            bail!("contracts.refresh_days must be at least 1");
        }
        if self.game.starting_gold < 0 {
            bail!("game.starting_gold cannot be negative");
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            bail!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            );
        }
        Ok(())
    }

    /// Session options derived from the `[game]` and `[contracts]` sections.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            seed: self.game.seed,
            contract_pool_size: self.contracts.pool_size,
            contract_refresh_days: self.contracts.refresh_days,
            autosave_on_travel: self.game.autosave_on_travel,
            ..SessionOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.contracts.pool_size, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_fill_in() {
        let config: Config = toml::from_str(
            "[game]\nseed = 9\n\n[contracts]\npool_size = 6\n\n[logging]\nlevel = \"DEBUG\"\n",
        )
        .unwrap();
        assert_eq!(config.game.seed, Some(9));
        assert_eq!(config.game.starting_gold, 250);
        assert_eq!(config.contracts.refresh_days, 1);
        assert!(config.validate().is_ok());

        let options = config.session_options();
        assert_eq!(options.seed, Some(9));
        assert_eq!(options.contract_pool_size, 6);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.contracts.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn default_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mercator.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = Config::load("/nonexistent/mercator.toml").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
