use crate::alerts::RenotifyGate;
use crate::error::StoreError;
use crate::model::{Alert, Target, TargetId, Timestamp};
use crate::probe::ProbeResult;
use crate::storage::AlertStore;
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// What happened to a target's alert after one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTransition {
    /// A new active alert was created
    Opened,
    /// The existing active alert was updated by another failing check
    Escalated,
    /// The active alert was resolved by a healthy check
    Resolved,
    /// Healthy check with no active alert
    Unchanged,
}

/// Outcome of feeding one probe result into the lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    pub transition: AlertTransition,
    /// The alert row after the transition, absent for `Unchanged` and `Resolved`
    pub alert: Option<Alert>,
    /// Whether a DOWN notification should go out for this check
    pub notify: bool,
}

impl AlertDecision {
    fn unchanged() -> Self {
        Self {
            transition: AlertTransition::Unchanged,
            alert: None,
            notify: false,
        }
    }
}

/// Alert message stored for a failing target
pub fn alert_message(target_name: &str, error: Option<&str>) -> String {
    format!(
        "API {} is DOWN: {}",
        target_name,
        error.unwrap_or("Unknown error")
    )
}

/// Manages the single active alert per target
///
/// Callers must serialize calls for the same target; the orchestrator does
/// this with a per-target lock.
pub struct AlertLifecycle {
    store: Arc<dyn AlertStore>,
}

impl AlertLifecycle {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Apply a probe result at the current time
    pub fn process(&self, target: &Target, result: &ProbeResult) -> Result<AlertDecision, StoreError> {
        self.process_at(target, result, Utc::now())
    }

    /// Apply a probe result at a specific time
    ///
    /// # Arguments
    ///
    /// * `target` - The checked target
    /// * `result` - Outcome of the probe
    /// * `now` - Evaluation time used for timestamps and the re-notify gate
    ///
    /// # Returns
    ///
    /// The transition taken and whether a DOWN notification is due
    pub fn process_at(
        &self,
        target: &Target,
        result: &ProbeResult,
        now: Timestamp,
    ) -> Result<AlertDecision, StoreError> {
        if result.is_up() {
            self.on_recovery(target, now)
        } else {
            let message = alert_message(&target.name, result.error_message.as_deref());
            self.on_failure(target, &message, now)
        }
    }

    /// Resolve a target's active alert outside of a check
    ///
    /// # Returns
    ///
    /// `true` if an active alert was resolved
    pub fn resolve(&self, target_id: TargetId, now: Timestamp) -> Result<bool, StoreError> {
        let resolved = self.store.resolve_alert(target_id, now)?;
        if resolved {
            info!("Alert for target {} resolved manually", target_id);
        }
        Ok(resolved)
    }

    fn on_failure(
        &self,
        target: &Target,
        message: &str,
        now: Timestamp,
    ) -> Result<AlertDecision, StoreError> {
        let existing = match self.store.get_active_alert(target.id)? {
            Some(alert) => alert,
            None => match self.store.create_alert(target.id, message, now) {
                Ok(alert) => {
                    info!("Alert opened for {}: {}", target.name, message);
                    return Ok(AlertDecision {
                        transition: AlertTransition::Opened,
                        alert: Some(alert),
                        notify: true,
                    });
                }
                // Another writer opened it between our read and insert
                Err(StoreError::ActiveAlertExists(_)) => {
                    warn!(
                        "Active alert for {} appeared concurrently, updating it instead",
                        target.name
                    );
                    self.store
                        .get_active_alert(target.id)?
                        .ok_or(StoreError::ActiveAlertExists(target.id))?
                }
                Err(e) => return Err(e),
            },
        };

        let gate = RenotifyGate::for_target(target);
        let due = gate.is_due_at(existing.last_alert_sent, now);
        let alert = self
            .store
            .touch_alert(existing.id, message, due.then_some(now))?;

        if due {
            debug!(
                "Alert {} for {} escalated to count {}, notification due",
                alert.id, target.name, alert.alert_count
            );
        } else {
            debug!(
                "Alert {} for {} escalated to count {}, next notification at {:?}",
                alert.id,
                target.name,
                alert.alert_count,
                gate.next_due_at(alert.last_alert_sent)
            );
        }

        Ok(AlertDecision {
            transition: AlertTransition::Escalated,
            alert: Some(alert),
            notify: due,
        })
    }

    fn on_recovery(&self, target: &Target, now: Timestamp) -> Result<AlertDecision, StoreError> {
        if !self.store.resolve_alert(target.id, now)? {
            return Ok(AlertDecision::unchanged());
        }

        info!("Alert resolved for {}", target.name);
        Ok(AlertDecision {
            transition: AlertTransition::Resolved,
            alert: None,
            notify: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertQuery;
    use crate::probe::ProbeFailure;
    use crate::storage::{MemoryStore, MockAlertStore};
    use chrono::{Duration, TimeZone};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn target() -> Target {
        let mut target = Target::new(1, "Payments", "https://payments.example.com");
        target.alert_interval = 15;
        target
    }

    fn down(message: &str) -> ProbeResult {
        ProbeResult::down(ProbeFailure::Transport, 30, message)
    }

    fn lifecycle() -> (Arc<MemoryStore>, AlertLifecycle) {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = AlertLifecycle::new(store.clone());
        (store, lifecycle)
    }

    #[test]
    fn test_alert_message_format() {
        assert_eq!(
            alert_message("Payments", Some("HTTP 500: Internal Server Error")),
            "API Payments is DOWN: HTTP 500: Internal Server Error"
        );
        assert_eq!(
            alert_message("Payments", None),
            "API Payments is DOWN: Unknown error"
        );
    }

    #[test]
    fn test_first_failure_opens_and_notifies() {
        let (store, lifecycle) = lifecycle();

        let decision = lifecycle
            .process_at(&target(), &down("connection refused"), t0())
            .unwrap();

        assert_eq!(decision.transition, AlertTransition::Opened);
        assert!(decision.notify);
        let alert = store.get_active_alert(1).unwrap().unwrap();
        assert_eq!(alert.alert_count, 1);
        assert_eq!(alert.last_alert_sent, Some(t0()));
        assert_eq!(alert.message, "API Payments is DOWN: connection refused");
    }

    #[test]
    fn test_repeat_failures_respect_interval() {
        let (store, lifecycle) = lifecycle();
        let target = target();

        let first = lifecycle.process_at(&target, &down("a"), t0()).unwrap();
        let second = lifecycle
            .process_at(&target, &down("b"), t0() + Duration::minutes(10))
            .unwrap();
        let third = lifecycle
            .process_at(&target, &down("c"), t0() + Duration::minutes(20))
            .unwrap();

        assert!(first.notify);
        assert!(!second.notify);
        assert!(third.notify);
        assert_eq!(second.transition, AlertTransition::Escalated);

        let alert = store.get_active_alert(1).unwrap().unwrap();
        assert_eq!(alert.alert_count, 3);
        assert_eq!(alert.message, "API Payments is DOWN: c");
        assert_eq!(alert.last_alert_sent, Some(t0() + Duration::minutes(20)));
    }

    #[test]
    fn test_suppressed_check_keeps_last_sent() {
        let (store, lifecycle) = lifecycle();
        let target = target();

        lifecycle.process_at(&target, &down("a"), t0()).unwrap();
        lifecycle
            .process_at(&target, &down("b"), t0() + Duration::minutes(10))
            .unwrap();
        // 16 minutes after the first send, not after the suppressed check
        let decision = lifecycle
            .process_at(&target, &down("c"), t0() + Duration::minutes(16))
            .unwrap();

        assert!(decision.notify);
        assert_eq!(store.get_active_alert(1).unwrap().unwrap().alert_count, 3);
    }

    #[test]
    fn test_recovery_resolves_once() {
        let (store, lifecycle) = lifecycle();
        let target = target();

        lifecycle.process_at(&target, &down("a"), t0()).unwrap();
        let resolved = lifecycle
            .process_at(&target, &ProbeResult::up(80), t0() + Duration::minutes(1))
            .unwrap();
        let again = lifecycle
            .process_at(&target, &ProbeResult::up(80), t0() + Duration::minutes(2))
            .unwrap();

        assert_eq!(resolved.transition, AlertTransition::Resolved);
        assert!(!resolved.notify);
        assert_eq!(again, AlertDecision::unchanged());

        let alerts = store.list_alerts(AlertQuery::default()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].resolved_at, Some(t0() + Duration::minutes(1)));
    }

    #[test]
    fn test_failure_after_recovery_opens_new_alert() {
        let (store, lifecycle) = lifecycle();
        let target = target();

        lifecycle.process_at(&target, &down("a"), t0()).unwrap();
        lifecycle
            .process_at(&target, &ProbeResult::up(80), t0() + Duration::minutes(1))
            .unwrap();
        let decision = lifecycle
            .process_at(&target, &down("b"), t0() + Duration::minutes(2))
            .unwrap();

        assert_eq!(decision.transition, AlertTransition::Opened);
        assert!(decision.notify);
        assert_eq!(store.alert_stats().unwrap().total, 2);
    }

    #[test]
    fn test_manual_resolve() {
        let (_store, lifecycle) = lifecycle();
        lifecycle.process_at(&target(), &down("a"), t0()).unwrap();

        assert!(lifecycle.resolve(1, t0()).unwrap());
        assert!(!lifecycle.resolve(1, t0()).unwrap());
    }

    #[test]
    fn test_concurrent_create_falls_back_to_update() {
        let existing = Alert {
            id: 9,
            target_id: 1,
            message: "old".to_string(),
            status: crate::model::AlertStatus::Active,
            triggered_at: t0(),
            resolved_at: None,
            last_alert_sent: Some(t0()),
            alert_count: 1,
        };

        let mut store = MockAlertStore::new();
        let mut reads = 0;
        let found = existing.clone();
        store.expect_get_active_alert().times(2).returning(move |_| {
            reads += 1;
            Ok(if reads == 1 { None } else { Some(found.clone()) })
        });
        store
            .expect_create_alert()
            .times(1)
            .returning(|id, _, _| Err(StoreError::ActiveAlertExists(id)));
        let touched = Alert {
            alert_count: 2,
            ..existing
        };
        store
            .expect_touch_alert()
            .withf(|id, _, sent_at| *id == 9 && sent_at.is_none())
            .times(1)
            .returning(move |_, _, _| Ok(touched.clone()));

        let lifecycle = AlertLifecycle::new(Arc::new(store));
        let decision = lifecycle
            .process_at(&target(), &down("b"), t0() + Duration::minutes(1))
            .unwrap();

        assert_eq!(decision.transition, AlertTransition::Escalated);
        assert!(!decision.notify);
    }

    #[test]
    fn test_store_failure_propagates() {
        let mut store = MockAlertStore::new();
        store
            .expect_get_active_alert()
            .returning(|_| Err(StoreError::LockPoisoned));

        let lifecycle = AlertLifecycle::new(Arc::new(store));
        let result = lifecycle.process_at(&target(), &down("a"), t0());
        assert!(matches!(result, Err(StoreError::LockPoisoned)));
    }
}
