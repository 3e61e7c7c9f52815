use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::acwr::AcwrConfig;
use crate::error::CoachError;
use crate::injury::MonitorConfig;
use crate::logging::LogConfig;
use crate::models::AbilityLevel;
use crate::pace::PaceConfig;
use crate::training_plan::PlanConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Engine tuning (thresholds, damping, ramp caps)
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LogConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Numeric tuning for every engine component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub acwr: AcwrConfig,
    #[serde(default)]
    pub plan: PlanConfig,
    #[serde(default)]
    pub pace: PaceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        self.acwr.validate()?;
        self.plan.validate()?;
        self.pace.validate()?;
        self.monitor.validate()
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: config_dir().join("coachrs.db"),
        }
    }
}

/// Optional value per ability level, used for threshold and damping overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerAbility<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beginner: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<T>,
}

impl<T> Default for PerAbility<T> {
    fn default() -> Self {
        PerAbility {
            beginner: None,
            intermediate: None,
            advanced: None,
        }
    }
}

impl<T> PerAbility<T> {
    pub fn get(&self, ability: AbilityLevel) -> Option<&T> {
        match ability {
            AbilityLevel::Beginner => self.beginner.as_ref(),
            AbilityLevel::Intermediate => self.intermediate.as_ref(),
            AbilityLevel::Advanced => self.advanced.as_ref(),
        }
    }

    pub fn set(&mut self, ability: AbilityLevel, value: T) {
        match ability {
            AbilityLevel::Beginner => self.beginner = Some(value),
            AbilityLevel::Intermediate => self.intermediate = Some(value),
            AbilityLevel::Advanced => self.advanced = Some(value),
        }
    }

    /// Iterate over the overrides that are present
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        [&self.beginner, &self.intermediate, &self.advanced]
            .into_iter()
            .filter_map(Option::as_ref)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".coachrs")
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            engine: EngineConfig::default(),
            logging: LogConfig::default(),
            storage: StorageSettings::default(),
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if !config_path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Ignoring config file {}: {:#}", config_path.display(), e);
                Self::default()
            }
        }
    }

    /// Save configuration to default location
    pub fn save_default(&mut self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to_file(config_path)
    }

    pub fn validate(&self) -> std::result::Result<(), CoachError> {
        self.engine.validate()
    }
}
