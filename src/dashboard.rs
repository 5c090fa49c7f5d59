//! Read-only views over targets, history and alerts
//!
//! Stored status is always binary. The four-way health label shown to users
//! is derived here from the latest observation and the target's threshold.

use crate::error::StoreError;
use crate::model::{Alert, AlertQuery, Observation, Target};
use crate::storage::{AlertStore, HistoryStore, TargetStore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Presentation label for a target's current health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthLabel {
    Healthy,
    /// Responding, but slower than the alert threshold
    Degraded,
    Unhealthy,
    #[serde(rename = "No Data")]
    NoData,
}

impl HealthLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLabel::Healthy => "Healthy",
            HealthLabel::Degraded => "Degraded",
            HealthLabel::Unhealthy => "Unhealthy",
            HealthLabel::NoData => "No Data",
        }
    }
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the health label from the most recent observation
///
/// Slowness is checked before the stored status, so a slow response that was
/// recorded as DOWN shows up as `Degraded` rather than `Unhealthy`.
pub fn health_label(latest: Option<&Observation>, alert_threshold: Option<u64>) -> HealthLabel {
    let observation = match latest {
        Some(observation) => observation,
        None => return HealthLabel::NoData,
    };

    let slow = match (observation.response_time, alert_threshold.filter(|&t| t > 0)) {
        (Some(elapsed), Some(threshold)) => elapsed > threshold,
        _ => false,
    };

    if slow {
        HealthLabel::Degraded
    } else if observation.status.is_up() {
        HealthLabel::Healthy
    } else {
        HealthLabel::Unhealthy
    }
}

/// Dashboard row for one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStatus {
    pub target: Target,
    pub label: HealthLabel,
    pub latest: Option<Observation>,
    pub active_alert: Option<Alert>,
}

/// An alert joined with the target it belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: Alert,
    pub target_name: String,
    pub target_url: String,
}

/// Snapshot of every active target, ordered by target id
pub fn target_statuses(
    targets: &dyn TargetStore,
    history: &dyn HistoryStore,
    alerts: &dyn AlertStore,
) -> Result<Vec<TargetStatus>, StoreError> {
    let mut rows = Vec::new();
    for target in targets.list_active_targets()? {
        let latest = history.latest_observation(target.id)?;
        let active_alert = alerts.get_active_alert(target.id)?;
        rows.push(TargetStatus {
            label: health_label(latest.as_ref(), target.alert_threshold),
            target,
            latest,
            active_alert,
        });
    }
    rows.sort_by_key(|row| row.target.id);
    Ok(rows)
}

/// Alerts matching `query`, newest first, with target name and url
///
/// Alerts whose target is no longer configured keep an empty name and url.
pub fn alert_views(
    targets: &dyn TargetStore,
    alerts: &dyn AlertStore,
    query: AlertQuery,
) -> Result<Vec<AlertView>, StoreError> {
    let mut cache: HashMap<i64, Option<Target>> = HashMap::new();
    let mut views = Vec::new();

    for alert in alerts.list_alerts(query)? {
        let target = match cache.get(&alert.target_id) {
            Some(target) => target.clone(),
            None => {
                let target = targets.get_target(alert.target_id)?;
                cache.insert(alert.target_id, target.clone());
                target
            }
        };
        let (target_name, target_url) = target
            .map(|t| (t.name, t.url))
            .unwrap_or_default();
        views.push(AlertView {
            alert,
            target_name,
            target_url,
        });
    }
    Ok(views)
}
