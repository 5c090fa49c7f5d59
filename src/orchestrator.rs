//! Check orchestration
//!
//! Runs probe → record → alert decision → notification for each target.
//! Targets are checked in parallel up to a concurrency limit; checks of the
//! same target are serialized by a per-target lock so the read-modify-write
//! on its active alert never races.

use crate::alerts::{AlertLifecycle, AlertTransition};
use crate::error::CheckError;
use crate::model::{CheckStatus, Target, TargetId, Timestamp};
use crate::notify::{AlertContent, Notifier, NotifyOutcome, SkipReason};
use crate::probe::{Probe, ProbeResult};
use crate::storage::{AlertStore, HistoryStore, TargetStore};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Source of "now" for check timestamps
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// What happened to the notification for one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// No notification was due for this check
    NotDue,
    Sent { recipients: usize },
    Skipped(SkipReason),
    Failed(String),
}

/// Outcome of checking one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub target_id: TargetId,
    pub target_name: String,
    pub checked_at: Timestamp,
    pub status: CheckStatus,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    /// Whether the observation made it into history
    pub recorded: bool,
    pub alert: AlertTransition,
    pub notification: NotificationStatus,
}

/// A target whose check could not be completed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckFailure {
    pub target_id: TargetId,
    pub target_name: String,
    pub error: String,
}

/// Outcome of one pass over all active targets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleSummary {
    pub reports: Vec<CheckReport>,
    pub failures: Vec<CheckFailure>,
}

impl CycleSummary {
    pub fn checked(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    pub fn up(&self) -> usize {
        self.count(|r| r.status == CheckStatus::Up)
    }

    pub fn down(&self) -> usize {
        self.count(|r| r.status == CheckStatus::Down)
    }

    pub fn alerts_opened(&self) -> usize {
        self.count(|r| r.alert == AlertTransition::Opened)
    }

    pub fn alerts_resolved(&self) -> usize {
        self.count(|r| r.alert == AlertTransition::Resolved)
    }

    pub fn notifications_sent(&self) -> usize {
        self.count(|r| matches!(r.notification, NotificationStatus::Sent { .. }))
    }

    pub fn notifications_failed(&self) -> usize {
        self.count(|r| matches!(r.notification, NotificationStatus::Failed(_)))
    }

    fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CheckReport) -> bool,
    {
        self.reports.iter().filter(|r| predicate(r)).count()
    }
}

/// Single-flight locks keyed by target id
#[derive(Default)]
struct TargetLocks {
    locks: Mutex<HashMap<TargetId, Arc<AsyncMutex<()>>>>,
}

impl TargetLocks {
    async fn acquire(&self, target_id: TargetId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(target_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Drives health checks for all configured targets
pub struct CheckOrchestrator {
    probe: Arc<dyn Probe>,
    targets: Arc<dyn TargetStore>,
    history: Arc<dyn HistoryStore>,
    lifecycle: AlertLifecycle,
    notifier: Notifier,
    locks: TargetLocks,
    max_concurrency: usize,
    notify_on_recovery: bool,
    clock: Clock,
}

impl CheckOrchestrator {
    /// Create an orchestrator over explicit dependencies
    ///
    /// # Arguments
    ///
    /// * `probe` - Performs the actual health check
    /// * `targets` - Source of targets and recipients
    /// * `history` - Observation log
    /// * `alerts` - Alert rows
    /// * `notifier` - Email dispatch
    pub fn new(
        probe: Arc<dyn Probe>,
        targets: Arc<dyn TargetStore>,
        history: Arc<dyn HistoryStore>,
        alerts: Arc<dyn AlertStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            probe,
            targets,
            history,
            lifecycle: AlertLifecycle::new(alerts),
            notifier,
            locks: TargetLocks::default(),
            max_concurrency: 4,
            notify_on_recovery: false,
            clock: Arc::new(Utc::now),
        }
    }

    /// Limit how many targets are checked at once (minimum 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Also email recipients when an alert resolves
    pub fn with_recovery_notifications(mut self, enabled: bool) -> Self {
        self.notify_on_recovery = enabled;
        self
    }

    /// Replace the wall clock, mainly for tests
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn lifecycle(&self) -> &AlertLifecycle {
        &self.lifecycle
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Check every active target once
    ///
    /// A failure on one target is logged and collected in the summary; the
    /// remaining targets are still checked.
    ///
    /// # Errors
    ///
    /// Only if the list of active targets cannot be loaded.
    pub async fn run_all_checks(&self) -> Result<CycleSummary, CheckError> {
        let targets = self.targets.list_active_targets()?;
        info!("Running health checks for {} target(s)", targets.len());

        let outcomes: Vec<(Target, Result<CheckReport, CheckError>)> = stream::iter(targets)
            .map(|target| async move {
                let outcome = self.check_target(&target).await;
                (target, outcome)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut summary = CycleSummary::default();
        for (target, outcome) in outcomes {
            match outcome {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    error!("Health check failed for {}: {}", target.name, e);
                    summary.failures.push(CheckFailure {
                        target_id: target.id,
                        target_name: target.name,
                        error: e.to_string(),
                    });
                }
            }
        }
        summary.reports.sort_by_key(|r| r.target_id);
        summary.failures.sort_by_key(|f| f.target_id);

        info!(
            "Health check cycle complete: {} checked, {} up, {} down, {} failed",
            summary.checked(),
            summary.up(),
            summary.down(),
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Check a single active target
    ///
    /// # Errors
    ///
    /// `CheckError::TargetNotFound` if the target does not exist or is
    /// inactive, `CheckError::Store` if the alert store fails.
    pub async fn run_check(&self, target_id: TargetId) -> Result<CheckReport, CheckError> {
        let target = self
            .targets
            .get_target(target_id)?
            .filter(|t| t.active)
            .ok_or(CheckError::TargetNotFound(target_id))?;
        self.check_target(&target).await
    }

    async fn check_target(&self, target: &Target) -> Result<CheckReport, CheckError> {
        let _guard = self.locks.acquire(target.id).await;

        let result = self.probe.check(target).await;
        let checked_at = (self.clock)();

        let recorded = match self.history.append_observation(
            target.id,
            result.status,
            Some(result.response_time_ms),
            checked_at,
        ) {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to record health check for {}: {}", target.name, e);
                false
            }
        };

        let decision = self.lifecycle.process_at(target, &result, checked_at)?;
        let due = decision.notify
            || (self.notify_on_recovery && decision.transition == AlertTransition::Resolved);

        let notification = if due {
            self.dispatch(target, &result, checked_at).await
        } else {
            NotificationStatus::NotDue
        };

        log_outcome(target, &result);

        Ok(CheckReport {
            target_id: target.id,
            target_name: target.name.clone(),
            checked_at,
            status: result.status,
            response_time_ms: result.response_time_ms,
            error_message: result.error_message,
            recorded,
            alert: decision.transition,
            notification,
        })
    }

    async fn dispatch(
        &self,
        target: &Target,
        result: &ProbeResult,
        checked_at: Timestamp,
    ) -> NotificationStatus {
        let recipients = match self.targets.list_enabled_recipients(target.id) {
            Ok(recipients) => recipients,
            Err(e) => {
                error!("Failed to load recipients for {}: {}", target.name, e);
                return NotificationStatus::Failed(e.to_string());
            }
        };

        let content = AlertContent::from_check(target, result, checked_at);
        match self.notifier.notify(&content, &recipients).await {
            Ok(NotifyOutcome::Sent { recipients }) => NotificationStatus::Sent { recipients },
            Ok(NotifyOutcome::Skipped(reason)) => NotificationStatus::Skipped(reason),
            Err(e) => {
                warn!("Alert email for {} failed: {}", target.name, e);
                NotificationStatus::Failed(e.to_string())
            }
        }
    }
}

fn log_outcome(target: &Target, result: &ProbeResult) {
    match &result.error_message {
        Some(message) => info!(
            "{} ({}): {} {}ms - {}",
            target.name, target.url, result.status, result.response_time_ms, message
        ),
        None => info!(
            "{} ({}): {} {}ms",
            target.name, target.url, result.status, result.response_time_ms
        ),
    }
}
