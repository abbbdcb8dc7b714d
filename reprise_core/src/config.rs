//! Configuration file support for Reprise.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/reprise/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub rewards: RewardConfig,

    #[serde(default)]
    pub quests: QuestConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Player identity and first-launch defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_id")]
    pub id: String,

    #[serde(default = "default_starting_coins")]
    pub starting_coins: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            id: default_player_id(),
            starting_coins: default_starting_coins(),
        }
    }
}

/// Reward amounts emitted by the workout session controller
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RewardConfig {
    /// XP for a finished set when the exercise does not carry its own value
    #[serde(default = "default_xp_per_set")]
    pub xp_per_set: u32,

    #[serde(default = "default_workout_base_xp")]
    pub workout_base_xp: u64,

    #[serde(default = "default_xp_per_exercise")]
    pub xp_per_exercise: u64,

    #[serde(default = "default_workout_base_coins")]
    pub workout_base_coins: u64,

    #[serde(default = "default_coins_per_exercise_pair")]
    pub coins_per_exercise_pair: u64,

    /// Rest applied when an exercise does not declare one
    #[serde(default = "default_rest_seconds")]
    pub default_rest_seconds: u32,

    /// Force and endurance gained per finished workout (capped at 2.0)
    #[serde(default = "default_attribute_gain")]
    pub attribute_gain_per_workout: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            xp_per_set: default_xp_per_set(),
            workout_base_xp: default_workout_base_xp(),
            xp_per_exercise: default_xp_per_exercise(),
            workout_base_coins: default_workout_base_coins(),
            coins_per_exercise_pair: default_coins_per_exercise_pair(),
            default_rest_seconds: default_rest_seconds(),
            attribute_gain_per_workout: default_attribute_gain(),
        }
    }
}

/// Daily quest parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestConfig {
    /// Liters logged by one "drink water" action
    #[serde(default = "default_water_glass_liters")]
    pub water_glass_liters: f64,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            water_glass_liters: default_water_glass_liters(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("reprise")
}

fn default_player_id() -> String {
    "00000000-0000-0000-0000-000000000001".into()
}

fn default_starting_coins() -> u64 {
    250
}

fn default_xp_per_set() -> u32 {
    10
}

fn default_workout_base_xp() -> u64 {
    100
}

fn default_xp_per_exercise() -> u64 {
    10
}

fn default_workout_base_coins() -> u64 {
    50
}

fn default_coins_per_exercise_pair() -> u64 {
    10
}

fn default_rest_seconds() -> u32 {
    60
}

fn default_attribute_gain() -> f64 {
    1.0
}

fn default_water_glass_liters() -> f64 {
    0.5
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("reprise").join("config.toml")
    }

    /// Reject values the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        let glass = self.quests.water_glass_liters;
        if !glass.is_finite() || glass <= 0.0 {
            return Err(Error::Config(format!(
                "water_glass_liters must be positive, got {}",
                glass
            )));
        }
        let gain = self.rewards.attribute_gain_per_workout;
        if !gain.is_finite() || !(0.0..=2.0).contains(&gain) {
            return Err(Error::Config(format!(
                "attribute_gain_per_workout must be within [0, 2], got {}",
                gain
            )));
        }
        if self.player.id.trim().is_empty() {
            return Err(Error::Config("player id must not be empty".into()));
        }
        Ok(())
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
