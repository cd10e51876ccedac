//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Journal modes accepted by SQLite
const JOURNAL_MODES: [&str; 6] = ["delete", "truncate", "persist", "memory", "wal", "off"];

/// Unitwork configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub validation: ValidationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub max_connections: u32,
    pub auto_migrate: bool,
    pub journal_mode: String,
    /// Engine-side lock wait before a write fails with a busy error
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Deadline for each asynchronous rule
    pub rule_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            max_connections: 5,
            auto_migrate: true,
            journal_mode: "wal".to_string(),
            busy_timeout_secs: 5,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            rule_timeout_ms: 5_000,
        }
    }
}

impl ValidationSettings {
    pub fn rule_timeout(&self) -> Duration {
        Duration::from_millis(self.rule_timeout_ms)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("UNITWORK_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("unitwork")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        if self.database.busy_timeout_secs == 0 {
            return Err(anyhow!("database.busy_timeout_secs must be at least 1"));
        }
        let mode = self.database.journal_mode.to_lowercase();
        if !JOURNAL_MODES.contains(&mode.as_str()) {
            return Err(anyhow!(
                "Invalid journal mode: {}. Valid options: {}",
                self.database.journal_mode,
                JOURNAL_MODES.join(", ")
            ));
        }
        if self.validation.rule_timeout_ms == 0 {
            return Err(anyhow!("validation.rule_timeout_ms must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database.path.display().to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),
            "database.auto_migrate" => Ok(self.database.auto_migrate.to_string()),
            "database.journal_mode" => Ok(self.database.journal_mode.clone()),
            "database.busy_timeout_secs" => Ok(self.database.busy_timeout_secs.to_string()),
            "validation.rule_timeout_ms" => Ok(self.validation.rule_timeout_ms.to_string()),
            _ => Err(anyhow!("Unknown configuration key: {}", key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = PathBuf::from(value);
            }
            "database.max_connections" => {
                self.database.max_connections = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
            }
            "database.auto_migrate" => {
                self.database.auto_migrate = value
                    .parse()
                    .with_context(|| format!("Invalid auto_migrate value: {}", value))?;
            }
            "database.journal_mode" => {
                self.database.journal_mode = value.to_lowercase();
            }
            "database.busy_timeout_secs" => {
                self.database.busy_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid busy_timeout_secs value: {}", value))?;
            }
            "validation.rule_timeout_ms" => {
                self.validation.rule_timeout_ms = value
                    .parse()
                    .with_context(|| format!("Invalid rule_timeout_ms value: {}", value))?;
            }
            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }
        self.validate()
    }
}
