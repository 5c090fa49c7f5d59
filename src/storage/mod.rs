//! Persistence seams for the check engine
//!
//! The engine only talks to these traits. Targets and recipients are read-only
//! configuration; history is append-only; alerts are the one piece of mutable
//! state and carry the "one active alert per target" invariant.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::model::{
    Alert, AlertId, AlertQuery, AlertStats, CheckStatus, Observation, ObservationId, Recipient,
    Target, TargetId, Timestamp,
};

/// Read access to monitored targets and their recipients
#[cfg_attr(test, mockall::automock)]
pub trait TargetStore: Send + Sync {
    fn list_active_targets(&self) -> Result<Vec<Target>, StoreError>;

    fn get_target(&self, id: TargetId) -> Result<Option<Target>, StoreError>;

    fn list_enabled_recipients(&self, target_id: TargetId) -> Result<Vec<Recipient>, StoreError>;
}

/// Append-only check history
#[cfg_attr(test, mockall::automock)]
pub trait HistoryStore: Send + Sync {
    /// Record one probe outcome and return the new observation id
    fn append_observation(
        &self,
        target_id: TargetId,
        status: CheckStatus,
        response_time: Option<u64>,
        checked_at: Timestamp,
    ) -> Result<ObservationId, StoreError>;

    /// Newest first, optionally limited to one target
    fn recent_observations(
        &self,
        target_id: Option<TargetId>,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError>;

    fn latest_observation(&self, target_id: TargetId) -> Result<Option<Observation>, StoreError>;
}

/// Alert rows and their lifecycle transitions
#[cfg_attr(test, mockall::automock)]
pub trait AlertStore: Send + Sync {
    fn get_active_alert(&self, target_id: TargetId) -> Result<Option<Alert>, StoreError>;

    /// Open a new active alert with `alert_count = 1` and `last_alert_sent = now`
    ///
    /// Fails with `StoreError::ActiveAlertExists` if the target already has one.
    fn create_alert(
        &self,
        target_id: TargetId,
        message: &str,
        now: Timestamp,
    ) -> Result<Alert, StoreError>;

    /// Replace the message and bump the count of an active alert
    ///
    /// `last_alert_sent` is only overwritten when `sent_at` is `Some`.
    fn touch_alert(
        &self,
        alert_id: AlertId,
        message: &str,
        sent_at: Option<Timestamp>,
    ) -> Result<Alert, StoreError>;

    /// Resolve the target's active alert, returning `false` if there was none
    fn resolve_alert(&self, target_id: TargetId, now: Timestamp) -> Result<bool, StoreError>;

    /// Newest first by trigger time
    fn list_alerts(&self, query: AlertQuery) -> Result<Vec<Alert>, StoreError>;

    fn alert_stats(&self) -> Result<AlertStats, StoreError>;
}
