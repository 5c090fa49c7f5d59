use crate::model::{Target, Timestamp};
use chrono::{Duration, Utc};

/// Gate for repeated notifications about the same active alert
///
/// A still-failing target is re-notified at most once per interval. The gate
/// is evaluated against the alert's `last_alert_sent`; an alert that has never
/// been sent passes trivially.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenotifyGate {
    /// Minimum time between two notifications for one alert
    interval: Duration,
}

impl RenotifyGate {
    /// Create a gate with the given interval
    ///
    /// # Arguments
    ///
    /// * `interval` - Minimum time between notifications, clamped to one minute
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::minutes(1)),
        }
    }

    /// Gate using the target's configured interval
    pub fn for_target(target: &Target) -> Self {
        Self::new(target.renotify_interval())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if a notification is due now
    pub fn is_due(&self, last_sent: Option<Timestamp>) -> bool {
        self.is_due_at(last_sent, Utc::now())
    }

    /// Check if a notification is due at a specific time
    ///
    /// # Arguments
    ///
    /// * `last_sent` - When the alert was last notified, if ever
    /// * `now` - Evaluation time
    ///
    /// # Returns
    ///
    /// `true` when nothing was sent yet or at least one interval has elapsed
    pub fn is_due_at(&self, last_sent: Option<Timestamp>, now: Timestamp) -> bool {
        match last_sent {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Earliest time the next notification may go out
    pub fn next_due_at(&self, last_sent: Option<Timestamp>) -> Option<Timestamp> {
        last_sent.map(|last| last + self.interval)
    }
}

impl Default for RenotifyGate {
    fn default() -> Self {
        Self::new(Duration::minutes(i64::from(
            crate::model::DEFAULT_ALERT_INTERVAL_MINUTES,
        )))
    }
}
