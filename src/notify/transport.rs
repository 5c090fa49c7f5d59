use crate::config::EmailConfig;
use crate::error::NotifyError;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{debug, info};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A fully addressed email ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub from_email: String,
    pub from_name: String,
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Trait for mail delivery implementations
pub trait MailTransport: Send + Sync {
    /// Deliver one email
    fn send<'a>(
        &'a self,
        email: &'a OutgoingEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

    /// Check connectivity and credentials without sending anything
    fn verify<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;
}

/// SMTP relay client
///
/// Uses implicit TLS on port 465 and STARTTLS on every other port, with
/// username/password authentication.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build a relay client from email settings
    ///
    /// # Errors
    ///
    /// `NotifyError::MissingFields` if host, credentials or sender are absent,
    /// `NotifyError::ConnectionFailed` if the relay cannot be configured.
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        let (host, username, password) = match (
            config.smtp_host.as_deref(),
            config.smtp_username.as_deref(),
            config.smtp_password.as_deref(),
        ) {
            (Some(host), Some(username), Some(password)) if config.has_required_fields() => {
                (host.trim(), username, password)
            }
            _ => return Err(NotifyError::MissingFields),
        };

        let builder = if config.implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| NotifyError::ConnectionFailed(e.to_string()))?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .timeout(Some(Duration::from_secs(config.timeout_seconds)))
            .build();

        debug!(
            "SMTP relay configured for {}:{} ({})",
            host,
            config.smtp_port,
            if config.implicit_tls() { "TLS" } else { "STARTTLS" }
        );
        Ok(Self { transport })
    }
}

fn parse_address(address: &str) -> Result<Address, NotifyError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build a multipart/alternative message from an outgoing email
pub fn build_message(email: &OutgoingEmail) -> Result<Message, NotifyError> {
    let from = Mailbox::new(
        Some(email.from_name.clone()),
        parse_address(&email.from_email)?,
    );
    let to = Mailbox::new(email.to_name.clone(), parse_address(&email.to_email)?);

    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .multipart(MultiPart::alternative_plain_html(
            email.text.clone(),
            email.html.clone(),
        ))
        .map_err(|e| NotifyError::MessageBuild(e.to_string()))
}

impl MailTransport for SmtpMailer {
    fn send<'a>(
        &'a self,
        email: &'a OutgoingEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(async move {
            let message = build_message(email)?;
            self.transport
                .send(message)
                .await
                .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
            debug!("Email '{}' delivered to {}", email.subject, email.to_email);
            Ok(())
        })
    }

    fn verify<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(async move {
            match self.transport.test_connection().await {
                Ok(true) => Ok(()),
                Ok(false) => Err(NotifyError::ConnectionFailed(
                    "server did not accept the connection".to_string(),
                )),
                Err(e) => Err(NotifyError::ConnectionFailed(e.to_string())),
            }
        })
    }
}

/// Mail transport that records emails instead of sending them
///
/// Used by `--dry-run` and in tests. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockMailer {
    /// Create a mailer that accepts every email
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mailer whose sends and handshakes always fail
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Add a delay to every send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Emails accepted so far
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.record().clone()
    }

    pub fn send_count(&self) -> usize {
        self.record().len()
    }

    fn record(&self) -> MutexGuard<'_, Vec<OutgoingEmail>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MailTransport for MockMailer {
    fn send<'a>(
        &'a self,
        email: &'a OutgoingEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(reason) = &self.failure {
                return Err(NotifyError::SendFailed(reason.clone()));
            }
            info!(
                "[dry-run] Email '{}' to {}",
                email.subject, email.to_email
            );
            self.record().push(email.clone());
            Ok(())
        })
    }

    fn verify<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(async move {
            match &self.failure {
                Some(reason) => Err(NotifyError::ConnectionFailed(reason.clone())),
                None => Ok(()),
            }
        })
    }
}
