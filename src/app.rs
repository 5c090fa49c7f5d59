//! Wiring of configuration into a running engine
//!
//! Targets and recipients come from the configuration file and are served
//! from memory. History and alerts live in SQLite.

use crate::config::Config;
use crate::dashboard::{self, AlertView, TargetStatus};
use crate::error::{CheckError, NotifyError, SetupError, StoreError};
use crate::model::{AlertQuery, AlertStats, Observation, TargetId};
use crate::notify::{MailTransport, MockMailer, Notifier, VerifyReport};
use crate::orchestrator::{CheckOrchestrator, CheckReport, CycleSummary};
use crate::probe::HttpProbe;
use crate::storage::{AlertStore, HistoryStore, MemoryStore, SqliteStore, TargetStore};
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// Database path that selects a throwaway in-memory database
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// A fully wired MonitorScope instance
pub struct App {
    catalog: Arc<MemoryStore>,
    store: Arc<SqliteStore>,
    orchestrator: CheckOrchestrator,
    outbox: Option<MockMailer>,
}

impl App {
    /// Build the engine from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `dry_run` - Record alert emails in memory instead of sending them
    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self, SetupError> {
        let catalog = Arc::new(MemoryStore::with_targets(
            config.targets(),
            config.recipients(),
        ));

        let store = if config.storage.database_path == IN_MEMORY_DATABASE {
            debug!("Using in-memory database");
            Arc::new(SqliteStore::in_memory()?)
        } else {
            info!("Using database at {}", config.storage.database_path);
            Arc::new(SqliteStore::open(&config.storage.database_path)?)
        };

        let probe = HttpProbe::new(
            Duration::from_secs(config.probe.timeout_seconds),
            &config.probe.user_agent,
        )?;

        let (notifier, outbox) = if dry_run {
            let mailer = MockMailer::new();
            let transport: Arc<dyn MailTransport> = Arc::new(mailer.clone());
            (
                Notifier::new(config.email.clone(), Some(transport)),
                Some(mailer),
            )
        } else {
            (Notifier::from_config(config.email.clone()), None)
        };

        let orchestrator = CheckOrchestrator::new(
            Arc::new(probe),
            catalog.clone(),
            store.clone(),
            store.clone(),
            notifier,
        )
        .with_max_concurrency(config.probe.max_concurrency)
        .with_recovery_notifications(config.alerts.notify_on_recovery);

        info!(
            "Monitoring {} target(s), email alerts {}",
            catalog_size(&catalog),
            if config.email.enabled { "enabled" } else { "disabled" }
        );

        Ok(Self {
            catalog,
            store,
            orchestrator,
            outbox,
        })
    }

    pub fn orchestrator(&self) -> &CheckOrchestrator {
        &self.orchestrator
    }

    /// Emails captured in dry-run mode
    pub fn outbox(&self) -> Option<&MockMailer> {
        self.outbox.as_ref()
    }

    pub async fn run_all_checks(&self) -> Result<CycleSummary, CheckError> {
        self.orchestrator.run_all_checks().await
    }

    pub async fn run_check(&self, target_id: TargetId) -> Result<CheckReport, CheckError> {
        self.orchestrator.run_check(target_id).await
    }

    pub fn status(&self) -> Result<Vec<TargetStatus>, StoreError> {
        dashboard::target_statuses(
            self.catalog.as_ref(),
            self.store.as_ref(),
            self.store.as_ref(),
        )
    }

    pub fn history(
        &self,
        target_id: Option<TargetId>,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        self.store.recent_observations(target_id, limit)
    }

    pub fn alerts(&self, query: AlertQuery) -> Result<Vec<AlertView>, StoreError> {
        dashboard::alert_views(self.catalog.as_ref(), self.store.as_ref(), query)
    }

    pub fn alert_stats(&self) -> Result<AlertStats, StoreError> {
        self.store.alert_stats()
    }

    /// Resolve a target's active alert by hand
    pub fn resolve_alert(&self, target_id: TargetId) -> Result<bool, StoreError> {
        self.orchestrator.lifecycle().resolve(target_id, Utc::now())
    }

    pub async fn verify_email(&self) -> VerifyReport {
        self.orchestrator.notifier().verify().await
    }

    pub async fn send_test_email(&self, to: &str) -> Result<(), NotifyError> {
        self.orchestrator.notifier().send_test_email(to).await
    }
}

fn catalog_size(catalog: &MemoryStore) -> usize {
    catalog
        .list_active_targets()
        .map(|targets| targets.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecipientConfig, TargetConfig};
    use crate::dashboard::HealthLabel;
    use crate::model::CheckStatus;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target_config(id: TargetId, url: String) -> TargetConfig {
        TargetConfig {
            id,
            name: format!("svc-{}", id),
            url,
            headers: None,
            expected_response_time: None,
            alert_threshold: None,
            alert_interval: None,
            active: true,
            recipients: vec![RecipientConfig {
                email: format!("team-{}@example.com", id),
                name: Some("Team".to_string()),
                enabled: true,
            }],
        }
    }

    fn config_for(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.storage.database_path = IN_MEMORY_DATABASE.to_string();
        config.email.enabled = true;
        config.email.smtp_host = Some("smtp.example.com".to_string());
        config.email.smtp_username = Some("monitor".to_string());
        config.email.smtp_password = Some("secret".to_string());
        config.email.from_email = Some("alerts@example.com".to_string());
        config.targets = vec![
            target_config(1, format!("{}/ok", server.uri())),
            target_config(2, format!("{}/broken", server.uri())),
        ];
        config
    }

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_dry_run_cycle() {
        let server = server().await;
        let app = App::from_config(&config_for(&server), true).unwrap();

        let summary = app.run_all_checks().await.unwrap();
        assert_eq!(summary.up(), 1);
        assert_eq!(summary.down(), 1);

        let outbox = app.outbox().unwrap();
        assert_eq!(outbox.send_count(), 1);
        assert_eq!(outbox.sent()[0].to_email, "team-2@example.com");
        assert_eq!(outbox.sent()[0].subject, "API Alert: svc-2 - DOWN");

        let status = app.status().unwrap();
        assert_eq!(status[0].label, HealthLabel::Healthy);
        assert_eq!(status[1].label, HealthLabel::Unhealthy);
        assert!(status[1].active_alert.is_some());

        let alerts = app.alerts(AlertQuery::default()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].target_name, "svc-2");
        assert_eq!(
            alerts[0].alert.message,
            "API svc-2 is DOWN: HTTP 503: Service Unavailable"
        );

        assert_eq!(app.history(None, 10).unwrap().len(), 2);
        assert_eq!(app.history(Some(1), 10).unwrap()[0].status, CheckStatus::Up);
    }

    #[tokio::test]
    async fn test_manual_resolve() {
        let server = server().await;
        let app = App::from_config(&config_for(&server), true).unwrap();
        app.run_check(2).await.unwrap();

        assert!(app.resolve_alert(2).unwrap());
        assert!(!app.resolve_alert(2).unwrap());

        let stats = app.alert_stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.resolved, 1);
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let server = server().await;
        let app = App::from_config(&config_for(&server), true).unwrap();
        assert!(matches!(
            app.run_check(42).await,
            Err(CheckError::TargetNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_history_persists_in_database_file() {
        let server = server().await;
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&server);
        config.storage.database_path = dir
            .path()
            .join("monitorscope.db")
            .to_string_lossy()
            .into_owned();

        {
            let app = App::from_config(&config, true).unwrap();
            app.run_all_checks().await.unwrap();
        }

        let reopened = App::from_config(&config, true).unwrap();
        assert_eq!(reopened.history(None, 10).unwrap().len(), 2);
        assert_eq!(reopened.alert_stats().unwrap().active, 1);
    }

    #[tokio::test]
    async fn test_dry_run_verify_and_test_email() {
        let server = server().await;
        let app = App::from_config(&config_for(&server), true).unwrap();

        assert!(app.verify_email().await.success);
        app.send_test_email("me@example.com").await.unwrap();
        assert_eq!(app.outbox().unwrap().sent()[0].to_email, "me@example.com");
    }

    #[tokio::test]
    async fn test_without_dry_run_has_no_outbox() {
        let server = server().await;
        let mut config = config_for(&server);
        config.email = Default::default();
        let app = App::from_config(&config, false).unwrap();

        assert!(app.outbox().is_none());
        let report = app.verify_email().await;
        assert!(!report.success);
        assert_eq!(report.message, "Email configuration not found");
    }
}
