//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `phonebot.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::path::PathBuf;
use std::time::Duration;

use phonebot_app::scheduler::SchedulerConfig;
use phonebot_domain::rule::ConflictPolicy;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Rule file import.
    pub rules: RulesConfig,
    /// Execution settings.
    pub scheduler: SchedulerSection,
    /// Built-in clock.
    pub clock: ClockConfig,
    /// Debug pokes.
    pub debug: DebugConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Where rule files are imported from at startup.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Directory scanned for `*.toml` rule files. Missing directory is fine.
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Deadline for actions without their own; `0` disables it.
    pub default_action_timeout_ms: u64,
    /// What to do when an exclusive rule fires while an instance is live.
    pub exclusive_policy: ConflictPolicy,
    /// Events buffered per bus subscriber.
    pub event_bus_capacity: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Publish `time.tick` every minute.
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Publish `debug.poke` on `SIGUSR1` (unix only).
    pub poke_on_signal: bool,
    /// Path carried by signal pokes.
    pub poke_path: String,
}

impl Config {
    /// Load configuration from `phonebot.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("phonebot.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PHONEBOT_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("PHONEBOT_RULES_DIR") {
            self.rules.dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("PHONEBOT_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database url must not be empty".to_string(),
            ));
        }
        if self.scheduler.event_bus_capacity == 0 {
            return Err(ConfigError::Validation(
                "event bus capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// Scheduler settings derived from the `[scheduler]` section.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let timeout = match self.scheduler.default_action_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        SchedulerConfig {
            default_action_timeout: timeout,
            exclusive_policy: self.scheduler.exclusive_policy,
            ..SchedulerConfig::default()
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:phonebot.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "phonebotd=info,phonebot_app=info,phonebot_adapter_builtin=info".to_string(),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("rules"),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            default_action_timeout_ms: 30_000,
            exclusive_policy: ConflictPolicy::Queue,
            event_bus_capacity: 256,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            poke_on_signal: true,
            poke_path: "/".to_string(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.database.url, "sqlite:phonebot.db?mode=rwc");
        assert_eq!(config.rules.dir, PathBuf::from("rules"));
        assert_eq!(config.scheduler.default_action_timeout_ms, 30_000);
        assert_eq!(config.scheduler.exclusive_policy, ConflictPolicy::Queue);
        assert!(config.clock.enabled);
        assert!(config.debug.poke_on_signal);
        assert_eq!(config.debug.poke_path, "/");
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.event_bus_capacity, 256);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [database]
            url = 'sqlite:test.db'

            [logging]
            filter = 'debug'

            [rules]
            dir = '/etc/phonebot/rules'

            [scheduler]
            default_action_timeout_ms = 5000
            exclusive_policy = 'drop'
            event_bus_capacity = 32

            [clock]
            enabled = false

            [debug]
            poke_on_signal = false
            poke_path = '/alarm'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.rules.dir, PathBuf::from("/etc/phonebot/rules"));
        assert_eq!(config.scheduler.default_action_timeout_ms, 5000);
        assert_eq!(config.scheduler.exclusive_policy, ConflictPolicy::Drop);
        assert_eq!(config.scheduler.event_bus_capacity, 32);
        assert!(!config.clock.enabled);
        assert!(!config.debug.poke_on_signal);
        assert_eq!(config.debug.poke_path, "/alarm");
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let toml = "
            [scheduler]
            exclusive_policy = 'drop'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.scheduler.exclusive_policy, ConflictPolicy::Drop);
        assert_eq!(config.scheduler.default_action_timeout_ms, 30_000);
        assert_eq!(config.database.url, "sqlite:phonebot.db?mode=rwc");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.scheduler.event_bus_capacity, 256);
    }

    #[test]
    fn should_reject_zero_bus_capacity() {
        let mut config = Config::default();
        config.scheduler.event_bus_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_empty_database_url() {
        let mut config = Config::default();
        config.database.url = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_accept_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn should_map_timeout_into_scheduler_config() {
        let mut config = Config::default();
        config.scheduler.default_action_timeout_ms = 1500;
        assert_eq!(
            config.scheduler_config().default_action_timeout,
            Some(Duration::from_millis(1500))
        );
        config.scheduler.default_action_timeout_ms = 0;
        assert_eq!(config.scheduler_config().default_action_timeout, None);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_reject_unknown_exclusive_policy() {
        let toml = "
            [scheduler]
            exclusive_policy = 'replace'
        ";
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
