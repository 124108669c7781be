//! Configuration file support for Pillbox.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/pillbox/config.toml`.
//! Every section is optional and falls back to defaults.

use crate::dispense::{DispensePolicy, DEFAULT_MISS_THRESHOLD_MINUTES};
use crate::{Error, Result, DEFAULT_PILLS_PER_BOX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub webhooks: WebhookConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub dispenser: DispenserConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub audio: AudioConfig,
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

/// Endpoints of the hosted webhook services
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_reminders_url")]
    pub reminders_url: String,

    #[serde(default = "default_logs_url")]
    pub logs_url: String,

    #[serde(default = "default_log_post_url")]
    pub log_post_url: String,

    #[serde(default = "default_agent_url")]
    pub agent_url: String,

    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            reminders_url: default_reminders_url(),
            logs_url: default_logs_url(),
            log_post_url: default_log_post_url(),
            agent_url: default_agent_url(),
            tts_url: default_tts_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Adherence classification parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_miss_threshold_minutes")]
    pub miss_threshold_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            miss_threshold_minutes: default_miss_threshold_minutes(),
        }
    }
}

/// Pill dispenser simulation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispenserConfig {
    #[serde(default = "default_pills_per_box")]
    pub pills_per_box: u32,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        Self {
            pills_per_box: default_pills_per_box(),
        }
    }
}

/// Voice agent settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
        }
    }
}

/// Local audio playback
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Program invoked with the path of an audio file to play it
    #[serde(default = "default_player")]
    pub player: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            player: default_player(),
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
    base.join("pillbox")
}

const WEBHOOK_BASE: &str = "https://n8n.n8n-projects.dev/webhook";

fn default_reminders_url() -> String {
    format!("{WEBHOOK_BASE}/sheets?sheet=Reminders")
}

fn default_logs_url() -> String {
    format!("{WEBHOOK_BASE}/sheets?sheet=Logs")
}

fn default_log_post_url() -> String {
    format!("{WEBHOOK_BASE}/log-dispense")
}

fn default_agent_url() -> String {
    format!("{WEBHOOK_BASE}/voice-agent")
}

fn default_tts_url() -> String {
    format!("{WEBHOOK_BASE}/elevenlabs-tts")
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_miss_threshold_minutes() -> u32 {
    DEFAULT_MISS_THRESHOLD_MINUTES as u32
}

fn default_pills_per_box() -> u32 {
    DEFAULT_PILLS_PER_BOX
}

fn default_language() -> String {
    "en".into()
}

fn default_player() -> String {
    if cfg!(target_os = "macos") {
        "afplay".into()
    } else {
        "mpg123".into()
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(
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
    pub fn default_config_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot locate a config directory".into()))?;
        Ok(base.join("pillbox").join("config.toml"))
    }

    /// Reject values that would break scheduling or the dispenser
    pub fn validate(&self) -> Result<()> {
        if self.dispenser.pills_per_box == 0 {
            return Err(Error::Config("dispenser.pills_per_box must be at least 1".into()));
        }
        if self.webhooks.timeout_secs == 0 {
            return Err(Error::Config("webhooks.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Classification policy derived from `[schedule]`
    pub fn dispense_policy(&self) -> DispensePolicy {
        DispensePolicy::with_threshold_minutes(self.schedule.miss_threshold_minutes)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schedule.miss_threshold_minutes, 15);
        assert_eq!(config.dispenser.pills_per_box, 5);
        assert_eq!(config.agent.language, "en");
        assert!(config.webhooks.logs_url.ends_with("sheet=Logs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.webhooks.tts_url = "http://localhost:5678/webhook/tts".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.webhooks.tts_url, "http://localhost:5678/webhook/tts");
        assert_eq!(loaded.dispenser.pills_per_box, config.dispenser.pills_per_box);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[schedule]
miss_threshold_minutes = 30
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.schedule.miss_threshold_minutes, 30);
        assert_eq!(config.dispenser.pills_per_box, 5); // default
        assert_eq!(
            config.dispense_policy().miss_threshold,
            chrono::Duration::minutes(30)
        );
    }

    #[test]
    fn test_zero_pills_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[dispenser]\npills_per_box = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
