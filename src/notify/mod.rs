//! Email notifications
//!
//! The [`Notifier`] renders alert emails and hands them to a
//! [`MailTransport`]. Delivery failures are reported to the caller but never
//! retried; alert state is not touched here.

pub mod template;
pub mod transport;

pub use template::{render, AlertContent, RenderedEmail};
pub use transport::{MailTransport, MockMailer, OutgoingEmail, SmtpMailer};

use crate::config::EmailConfig;
use crate::error::NotifyError;
use crate::model::Recipient;
use chrono::Utc;
use futures::future::join_all;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Why no email went out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Email alerts are switched off
    Disabled,
    /// Enabled, but the SMTP relay is not usable
    NotConfigured,
    /// The target has no enabled recipients
    NoRecipients,
}

/// Result of a notification attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent { recipients: usize },
    Skipped(SkipReason),
}

/// Result of the email configuration self-test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub success: bool,
    pub message: String,
}

/// Renders and dispatches alert emails
pub struct Notifier {
    config: EmailConfig,
    transport: Option<Arc<dyn MailTransport>>,
}

impl Notifier {
    /// Create a notifier with an explicit transport
    ///
    /// # Arguments
    ///
    /// * `config` - Email settings (enabled flag and sender identity)
    /// * `transport` - Delivery backend, `None` when SMTP is not usable
    pub fn new(config: EmailConfig, transport: Option<Arc<dyn MailTransport>>) -> Self {
        Self { config, transport }
    }

    /// Create a notifier backed by an SMTP relay built from `config`
    ///
    /// An incomplete configuration yields a notifier without a transport;
    /// [`Notifier::verify`] reports why.
    pub fn from_config(config: EmailConfig) -> Self {
        let transport: Option<Arc<dyn MailTransport>> = match SmtpMailer::from_config(&config) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                if config.enabled {
                    warn!("Email alerts enabled but SMTP relay unavailable: {}", e);
                }
                None
            }
        };
        Self::new(config, transport)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Email every recipient about a check
    ///
    /// All sends run concurrently and are awaited together. If any of them
    /// fails the whole batch is reported as failed.
    ///
    /// # Returns
    ///
    /// `Sent` with the number of recipients, or `Skipped` when notifications
    /// are disabled, SMTP is unusable or there is nobody to notify
    pub async fn notify(
        &self,
        content: &AlertContent,
        recipients: &[Recipient],
    ) -> Result<NotifyOutcome, NotifyError> {
        if !self.config.enabled {
            info!(
                "Email alerts disabled, not notifying about {}",
                content.target_name
            );
            return Ok(NotifyOutcome::Skipped(SkipReason::Disabled));
        }
        if recipients.is_empty() {
            info!(
                "No enabled recipients for {}, skipping email",
                content.target_name
            );
            return Ok(NotifyOutcome::Skipped(SkipReason::NoRecipients));
        }
        let transport = match &self.transport {
            Some(transport) => transport,
            None => {
                warn!(
                    "SMTP relay not configured, cannot email about {}",
                    content.target_name
                );
                return Ok(NotifyOutcome::Skipped(SkipReason::NotConfigured));
            }
        };

        let rendered = render(content);
        let emails: Vec<OutgoingEmail> = recipients
            .iter()
            .map(|r| self.address(&rendered, &r.email, r.name.clone()))
            .collect();

        let results = join_all(emails.iter().map(|email| transport.send(email))).await;
        let errors: Vec<NotifyError> = results.into_iter().filter_map(Result::err).collect();

        if errors.is_empty() {
            info!(
                "Alert email '{}' sent to {} recipient(s)",
                rendered.subject,
                emails.len()
            );
            Ok(NotifyOutcome::Sent {
                recipients: emails.len(),
            })
        } else {
            error!(
                "Failed to send {} of {} alert emails for {}",
                errors.len(),
                emails.len(),
                content.target_name
            );
            Err(NotifyError::BatchFailed {
                total: emails.len(),
                errors,
            })
        }
    }

    /// Self-test of the email configuration
    ///
    /// Checks that the relay is configured, enabled and complete, then
    /// performs an SMTP handshake without sending mail.
    pub async fn verify(&self) -> VerifyReport {
        match self.check_ready().await {
            Ok(_) => VerifyReport {
                success: true,
                message: "Email configuration is valid".to_string(),
            },
            Err(e) => VerifyReport {
                success: false,
                message: e.to_string(),
            },
        }
    }

    /// Verify the configuration, then send the sample alert to `to`
    pub async fn send_test_email(&self, to: &str) -> Result<(), NotifyError> {
        let transport = self.check_ready().await?;

        let rendered = render(&AlertContent::sample(Utc::now()));
        let email = self.address(&rendered, to, None);
        transport.send(&email).await?;

        info!("Test email sent to {}", to);
        Ok(())
    }

    async fn check_ready(&self) -> Result<&Arc<dyn MailTransport>, NotifyError> {
        if !self.config.is_configured() {
            return Err(NotifyError::NotConfigured);
        }
        if !self.config.enabled {
            return Err(NotifyError::Disabled);
        }
        if !self.config.has_required_fields() {
            return Err(NotifyError::MissingFields);
        }
        let transport = self.transport.as_ref().ok_or_else(|| {
            NotifyError::ConnectionFailed("SMTP relay could not be configured".to_string())
        })?;
        transport.verify().await?;
        Ok(transport)
    }

    fn address(&self, rendered: &RenderedEmail, to: &str, to_name: Option<String>) -> OutgoingEmail {
        OutgoingEmail {
            from_email: self.config.from_email.clone().unwrap_or_default(),
            from_name: self.config.from_name.clone(),
            to_email: to.to_string(),
            to_name,
            subject: rendered.subject.clone(),
            html: rendered.html.clone(),
            text: rendered.text.clone(),
        }
    }
}
