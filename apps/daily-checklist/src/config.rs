//! Configuration for the daily checklist.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APP_NAME: &str = "daily-checklist";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Daily reset settings.
    #[serde(default)]
    pub reset: ResetConfig,
    /// Countdown settings.
    #[serde(default)]
    pub timer: TimerConfig,
    /// Alarm settings.
    #[serde(default)]
    pub alarm: AlarmConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from default path.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| Self::parse(&s).ok())
            .unwrap_or_default()
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Get configuration file path.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|d| d.config_dir().join("config.toml"))
    }

    /// Database path: the configured override, else the platform data dir.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.storage.path.clone().or_else(|| {
            directories::ProjectDirs::from("", "", APP_NAME)
                .map(|d| d.data_dir().join("checklist.db"))
        })
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file override.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Daily reset settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetConfig {
    /// Seconds between day-boundary checks.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
        }
    }
}

impl ResetConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }
}

fn default_poll_secs() -> u64 {
    10
}

/// Countdown settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Count down every in-progress task, not only observed ones.
    #[serde(default = "default_true")]
    pub follow_all: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { follow_all: true }
    }
}

fn default_true() -> bool {
    true
}

/// Alarm settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Which alarm to use.
    #[serde(default)]
    pub kind: AlarmKind,
    /// Program and arguments for the command alarm.
    #[serde(default)]
    pub command: Vec<String>,
}

/// Alarm backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlarmKind {
    #[default]
    Bell,
    Command,
    Silent,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.reset.poll_interval(), Duration::from_secs(10));
        assert!(config.timer.follow_all);
        assert_eq!(config.alarm.kind, AlarmKind::Bell);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
            [storage]
            path = "/tmp/list.db"

            [reset]
            poll_secs = 0

            [alarm]
            kind = "command"
            command = ["paplay", "/usr/share/sounds/bell.oga"]
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path(), Some(PathBuf::from("/tmp/list.db")));
        assert_eq!(config.reset.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.alarm.kind, AlarmKind::Command);
        assert_eq!(config.alarm.command.len(), 2);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), config);
    }
}
