//! Core data types for MonitorScope
//!
//! Targets and recipients are owned by configuration; observations and alerts
//! are produced by the check engine and persisted through the store traits.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

pub type TargetId = i64;
pub type AlertId = i64;
pub type ObservationId = i64;

/// Minutes between repeated notifications for a still-failing target
pub const DEFAULT_ALERT_INTERVAL_MINUTES: u32 = 15;

/// A monitored HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub url: String,
    /// Raw JSON object of extra request headers, parsed at probe time
    pub headers: Option<String>,
    /// Informational only, not used for classification
    pub expected_response_time: Option<u64>,
    /// Successful responses slower than this many milliseconds count as DOWN
    pub alert_threshold: Option<u64>,
    /// Minutes between repeated notifications while the alert stays active
    pub alert_interval: u32,
    pub active: bool,
}

impl Target {
    /// Create an active target with no headers, no threshold and the default interval
    pub fn new(id: TargetId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            headers: None,
            expected_response_time: None,
            alert_threshold: None,
            alert_interval: DEFAULT_ALERT_INTERVAL_MINUTES,
            active: true,
        }
    }

    /// Threshold used for classification; zero means "not configured"
    pub fn effective_threshold(&self) -> Option<u64> {
        self.alert_threshold.filter(|&t| t > 0)
    }

    /// Re-notification interval, never shorter than one minute
    pub fn renotify_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.alert_interval.max(1)))
    }
}

/// Binary outcome of a single health check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Up,
    Down,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "UP",
            CheckStatus::Down => "DOWN",
        }
    }

    /// Parse the stored representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UP" => Some(CheckStatus::Up),
            "DOWN" => Some(CheckStatus::Down),
            _ => None,
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, CheckStatus::Up)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded health check, append-only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub id: ObservationId,
    pub target_id: TargetId,
    pub status: CheckStatus,
    pub response_time: Option<u64>,
    pub checked_at: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(AlertStatus::Active),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert raised for a failing target
///
/// At most one alert per target is `Active` at any time. While active, every
/// failing check bumps `alert_count` and replaces `message`; `last_alert_sent`
/// only moves when a notification is due.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: AlertId,
    pub target_id: TargetId,
    pub message: String,
    pub status: AlertStatus,
    pub triggered_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub last_alert_sent: Option<Timestamp>,
    pub alert_count: u32,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// Email recipient of a target's alerts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub id: i64,
    pub target_id: TargetId,
    pub email: String,
    pub name: Option<String>,
    pub enabled: bool,
}

/// Filter for alert listings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertQuery {
    pub target_id: Option<TargetId>,
    pub active_only: bool,
    pub limit: usize,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            target_id: None,
            active_only: false,
            limit: 50,
        }
    }
}

/// Aggregate counts over all stored alerts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertStats {
    pub total: u64,
    pub active: u64,
    pub resolved: u64,
    pub avg_alert_count: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renotify_interval_has_one_minute_floor() {
        let mut target = Target::new(1, "api", "https://example.com");
        assert_eq!(target.renotify_interval(), Duration::minutes(15));

        target.alert_interval = 0;
        assert_eq!(target.renotify_interval(), Duration::minutes(1));
    }

    #[test]
    fn test_zero_threshold_is_unset() {
        let mut target = Target::new(1, "api", "https://example.com");
        target.alert_threshold = Some(0);
        assert_eq!(target.effective_threshold(), None);

        target.alert_threshold = Some(2000);
        assert_eq!(target.effective_threshold(), Some(2000));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&CheckStatus::Up).unwrap(), "\"UP\"");
        assert_eq!(
            serde_json::to_string(&AlertStatus::Resolved).unwrap(),
            "\"resolved\""
        );
        assert_eq!(CheckStatus::parse("DOWN"), Some(CheckStatus::Down));
        assert_eq!(CheckStatus::parse("down"), None);
        assert_eq!(AlertStatus::parse("active"), Some(AlertStatus::Active));
    }
}
