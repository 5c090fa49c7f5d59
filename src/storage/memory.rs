use super::{AlertStore, HistoryStore, TargetStore};
use crate::error::StoreError;
use crate::model::{
    Alert, AlertId, AlertQuery, AlertStats, AlertStatus, CheckStatus, Observation, ObservationId,
    Recipient, Target, TargetId, Timestamp,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// In-process store implementing every store trait
///
/// Used for targets and recipients loaded from configuration, and as a
/// complete backend in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    targets: BTreeMap<TargetId, Target>,
    recipients: Vec<Recipient>,
    observations: Vec<Observation>,
    alerts: Vec<Alert>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with targets and recipients
    pub fn with_targets(targets: Vec<Target>, recipients: Vec<Recipient>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                targets: targets.into_iter().map(|t| (t.id, t)).collect(),
                recipients,
                ..MemoryState::default()
            }),
        }
    }

    /// Insert or replace a target
    pub fn upsert_target(&self, target: Target) -> Result<(), StoreError> {
        self.lock()?.targets.insert(target.id, target);
        Ok(())
    }

    pub fn add_recipient(&self, recipient: Recipient) -> Result<(), StoreError> {
        self.lock()?.recipients.push(recipient);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl TargetStore for MemoryStore {
    fn list_active_targets(&self) -> Result<Vec<Target>, StoreError> {
        Ok(self
            .lock()?
            .targets
            .values()
            .filter(|t| t.active)
            .cloned()
            .collect())
    }

    fn get_target(&self, id: TargetId) -> Result<Option<Target>, StoreError> {
        Ok(self.lock()?.targets.get(&id).cloned())
    }

    fn list_enabled_recipients(&self, target_id: TargetId) -> Result<Vec<Recipient>, StoreError> {
        Ok(self
            .lock()?
            .recipients
            .iter()
            .filter(|r| r.target_id == target_id && r.enabled)
            .cloned()
            .collect())
    }
}

impl HistoryStore for MemoryStore {
    fn append_observation(
        &self,
        target_id: TargetId,
        status: CheckStatus,
        response_time: Option<u64>,
        checked_at: Timestamp,
    ) -> Result<ObservationId, StoreError> {
        let mut state = self.lock()?;
        let id = state.observations.len() as ObservationId + 1;
        state.observations.push(Observation {
            id,
            target_id,
            status,
            response_time,
            checked_at,
        });
        Ok(id)
    }

    fn recent_observations(
        &self,
        target_id: Option<TargetId>,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        let state = self.lock()?;
        let mut observations: Vec<Observation> = state
            .observations
            .iter()
            .filter(|o| target_id.map_or(true, |id| o.target_id == id))
            .cloned()
            .collect();
        observations.sort_by(|a, b| b.checked_at.cmp(&a.checked_at).then(b.id.cmp(&a.id)));
        observations.truncate(limit);
        Ok(observations)
    }

    fn latest_observation(&self, target_id: TargetId) -> Result<Option<Observation>, StoreError> {
        Ok(self
            .recent_observations(Some(target_id), 1)?
            .into_iter()
            .next())
    }
}

impl AlertStore for MemoryStore {
    fn get_active_alert(&self, target_id: TargetId) -> Result<Option<Alert>, StoreError> {
        Ok(self
            .lock()?
            .alerts
            .iter()
            .find(|a| a.target_id == target_id && a.is_active())
            .cloned())
    }

    fn create_alert(
        &self,
        target_id: TargetId,
        message: &str,
        now: Timestamp,
    ) -> Result<Alert, StoreError> {
        let mut state = self.lock()?;
        if state
            .alerts
            .iter()
            .any(|a| a.target_id == target_id && a.is_active())
        {
            return Err(StoreError::ActiveAlertExists(target_id));
        }

        let alert = Alert {
            id: state.alerts.len() as AlertId + 1,
            target_id,
            message: message.to_string(),
            status: AlertStatus::Active,
            triggered_at: now,
            resolved_at: None,
            last_alert_sent: Some(now),
            alert_count: 1,
        };
        state.alerts.push(alert.clone());
        Ok(alert)
    }

    fn touch_alert(
        &self,
        alert_id: AlertId,
        message: &str,
        sent_at: Option<Timestamp>,
    ) -> Result<Alert, StoreError> {
        let mut state = self.lock()?;
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && a.is_active())
            .ok_or(StoreError::AlertNotFound(alert_id))?;

        alert.message = message.to_string();
        alert.alert_count += 1;
        if sent_at.is_some() {
            alert.last_alert_sent = sent_at;
        }
        Ok(alert.clone())
    }

    fn resolve_alert(&self, target_id: TargetId, now: Timestamp) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state
            .alerts
            .iter_mut()
            .find(|a| a.target_id == target_id && a.is_active())
        {
            Some(alert) => {
                alert.status = AlertStatus::Resolved;
                alert.resolved_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_alerts(&self, query: AlertQuery) -> Result<Vec<Alert>, StoreError> {
        let state = self.lock()?;
        let mut alerts: Vec<Alert> = state
            .alerts
            .iter()
            .filter(|a| query.target_id.map_or(true, |id| a.target_id == id))
            .filter(|a| !query.active_only || a.is_active())
            .cloned()
            .collect();
        alerts.sort_by(|a, b| {
            b.triggered_at
                .cmp(&a.triggered_at)
                .then(b.id.cmp(&a.id))
        });
        alerts.truncate(query.limit);
        Ok(alerts)
    }

    fn alert_stats(&self) -> Result<AlertStats, StoreError> {
        let state = self.lock()?;
        let total = state.alerts.len() as u64;
        let active = state.alerts.iter().filter(|a| a.is_active()).count() as u64;
        let count_sum: u64 = state.alerts.iter().map(|a| u64::from(a.alert_count)).sum();

        Ok(AlertStats {
            total,
            active,
            resolved: total - active,
            avg_alert_count: if total == 0 {
                0.0
            } else {
                count_sum as f64 / total as f64
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_active_targets_and_recipients() {
        let mut inactive = Target::new(2, "old", "https://old.example.com");
        inactive.active = false;
        let store = MemoryStore::with_targets(
            vec![Target::new(1, "api", "https://api.example.com"), inactive],
            vec![
                Recipient {
                    id: 1,
                    target_id: 1,
                    email: "a@example.com".to_string(),
                    name: None,
                    enabled: true,
                },
                Recipient {
                    id: 2,
                    target_id: 1,
                    email: "b@example.com".to_string(),
                    name: None,
                    enabled: false,
                },
            ],
        );

        let active = store.list_active_targets().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 1);
        assert!(store.get_target(2).unwrap().is_some());
        assert!(store.get_target(3).unwrap().is_none());

        let recipients = store.list_enabled_recipients(1).unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].email, "a@example.com");
    }

    #[test]
    fn test_history_is_newest_first() {
        let store = MemoryStore::new();
        store
            .append_observation(1, CheckStatus::Up, Some(120), t0())
            .unwrap();
        store
            .append_observation(1, CheckStatus::Down, Some(30000), t0() + Duration::minutes(5))
            .unwrap();
        store
            .append_observation(2, CheckStatus::Up, Some(80), t0() + Duration::minutes(1))
            .unwrap();

        let all = store.recent_observations(None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].status, CheckStatus::Down);

        let latest = store.latest_observation(1).unwrap().unwrap();
        assert_eq!(latest.response_time, Some(30000));

        assert_eq!(store.recent_observations(Some(2), 10).unwrap().len(), 1);
        assert_eq!(store.recent_observations(None, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_single_active_alert_per_target() {
        let store = MemoryStore::new();
        store.create_alert(1, "down", t0()).unwrap();

        let second = store.create_alert(1, "down again", t0());
        assert!(matches!(second, Err(StoreError::ActiveAlertExists(1))));

        // A different target is unaffected
        assert!(store.create_alert(2, "down", t0()).is_ok());
    }

    #[test]
    fn test_touch_only_moves_last_sent_when_given() {
        let store = MemoryStore::new();
        let alert = store.create_alert(1, "first", t0()).unwrap();
        assert_eq!(alert.alert_count, 1);
        assert_eq!(alert.last_alert_sent, Some(t0()));

        let touched = store.touch_alert(alert.id, "second", None).unwrap();
        assert_eq!(touched.alert_count, 2);
        assert_eq!(touched.message, "second");
        assert_eq!(touched.last_alert_sent, Some(t0()));

        let later = t0() + Duration::minutes(20);
        let touched = store.touch_alert(alert.id, "third", Some(later)).unwrap();
        assert_eq!(touched.alert_count, 3);
        assert_eq!(touched.last_alert_sent, Some(later));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let store = MemoryStore::new();
        let alert = store.create_alert(1, "down", t0()).unwrap();

        assert!(store.resolve_alert(1, t0() + Duration::minutes(3)).unwrap());
        assert!(!store.resolve_alert(1, t0() + Duration::minutes(4)).unwrap());
        assert!(store.get_active_alert(1).unwrap().is_none());

        let touched = store.touch_alert(alert.id, "late", None);
        assert!(matches!(touched, Err(StoreError::AlertNotFound(_))));

        // A new incident opens a fresh alert
        let reopened = store.create_alert(1, "down", t0() + Duration::hours(1)).unwrap();
        assert_ne!(reopened.id, alert.id);
    }

    #[test]
    fn test_alert_listing_and_stats() {
        let store = MemoryStore::new();
        let first = store.create_alert(1, "a", t0()).unwrap();
        store.touch_alert(first.id, "a", None).unwrap();
        store.touch_alert(first.id, "a", None).unwrap();
        store.resolve_alert(1, t0() + Duration::minutes(10)).unwrap();
        store.create_alert(2, "b", t0() + Duration::minutes(1)).unwrap();

        let all = store.list_alerts(AlertQuery::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].target_id, 2);

        let active = store
            .list_alerts(AlertQuery {
                active_only: true,
                ..AlertQuery::default()
            })
            .unwrap();
        assert_eq!(active.len(), 1);

        let stats = store.alert_stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.resolved, 1);
        assert!((stats.avg_alert_count - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_stats() {
        let stats = MemoryStore::new().alert_stats().unwrap();
        assert_eq!(stats, AlertStats::default());
    }
}
