//! Configuration management
//!
//! MonitorScope is configured from a single TOML file. Every section is
//! optional; missing values fall back to the defaults below.

mod email;

pub use email::EmailConfig;

use crate::error::ConfigError;
use crate::model::{Recipient, Target, TargetId, DEFAULT_ALERT_INTERVAL_MINUTES};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Where check history and alerts are persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// SQLite database file, or `:memory:` for a throwaway database
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

/// HTTP probe settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound on targets checked in parallel
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Alert lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertsConfig {
    /// Interval applied to targets that do not set `alert_interval`
    #[serde(default = "default_alert_interval")]
    pub default_interval_minutes: u32,

    /// Also email recipients when an active alert resolves
    #[serde(default)]
    pub notify_on_recovery: bool,
}

/// In-process scheduling for `watch` mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    #[serde(default = "default_schedule_interval")]
    pub interval_seconds: u64,
}

/// A `[[targets]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    pub id: TargetId,
    pub name: String,
    pub url: String,

    /// JSON object of extra request headers, e.g. `{"Authorization": "Bearer x"}`
    #[serde(default)]
    pub headers: Option<String>,

    #[serde(default)]
    pub expected_response_time: Option<u64>,

    #[serde(default)]
    pub alert_threshold: Option<u64>,

    #[serde(default)]
    pub alert_interval: Option<u32>,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub recipients: Vec<RecipientConfig>,
}

/// A `[[targets.recipients]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipientConfig {
    pub email: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_database_path() -> String {
    "monitorscope.db".to_string()
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "MonitorScope/1.0".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_alert_interval() -> u32 {
    DEFAULT_ALERT_INTERVAL_MINUTES
}

fn default_schedule_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_probe_timeout(),
            user_agent: default_user_agent(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            default_interval_minutes: default_alert_interval(),
            notify_on_recovery: false,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_schedule_interval(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// `ConfigError::ReadError` if the file cannot be read, `TomlError` if it is
    /// not valid TOML and `ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and target consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "probe.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.probe.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "probe.max_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.schedule.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "schedule.interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.storage.database_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.database_path must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate target id {}",
                    target.id
                )));
            }
            if target.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "target {} has an empty name",
                    target.id
                )));
            }
            if !(target.url.starts_with("http://") || target.url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "target {} url must start with http:// or https://: {}",
                    target.id, target.url
                )));
            }
            if let Some(recipient) = target.recipients.iter().find(|r| !r.email.contains('@')) {
                return Err(ConfigError::ValidationError(format!(
                    "target {} has an invalid recipient email: {}",
                    target.id, recipient.email
                )));
            }
        }

        Ok(())
    }

    /// Targets with section defaults applied
    pub fn targets(&self) -> Vec<Target> {
        self.targets
            .iter()
            .map(|t| Target {
                id: t.id,
                name: t.name.clone(),
                url: t.url.clone(),
                headers: t.headers.clone(),
                expected_response_time: t.expected_response_time,
                alert_threshold: t.alert_threshold,
                alert_interval: t
                    .alert_interval
                    .unwrap_or(self.alerts.default_interval_minutes),
                active: t.active,
            })
            .collect()
    }

    /// All recipients across targets, numbered in file order starting at 1
    pub fn recipients(&self) -> Vec<Recipient> {
        self.targets
            .iter()
            .flat_map(|t| t.recipients.iter().map(move |r| (t.id, r)))
            .enumerate()
            .map(|(index, (target_id, r))| Recipient {
                id: index as i64 + 1,
                target_id,
                email: r.email.clone(),
                name: r.name.clone(),
                enabled: r.enabled,
            })
            .collect()
    }
}
