use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SMTP relay settings for alert emails
///
/// Values from the `[email]` table can be overridden by the `SMTP_*` and
/// `EMAIL_*` environment variables, see [`EmailConfig::apply_env`].
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    #[serde(default)]
    pub from_email: Option<String>,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Connection timeout for the SMTP handshake and sends
    #[serde(default = "default_smtp_timeout")]
    pub timeout_seconds: u64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "MonitorScope Alerts".to_string()
}

fn default_smtp_timeout() -> u64 {
    10
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_email: None,
            from_name: default_from_name(),
            timeout_seconds: default_smtp_timeout(),
        }
    }
}

// Keeps the password out of logs
impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("enabled", &self.enabled)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field(
                "smtp_password",
                &self.smtp_password.as_ref().map(|_| "********"),
            )
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl EmailConfig {
    /// Whether any SMTP relay has been configured at all
    pub fn is_configured(&self) -> bool {
        non_empty(&self.smtp_host).is_some()
    }

    /// Host, username, password and sender address are all present
    pub fn has_required_fields(&self) -> bool {
        non_empty(&self.smtp_host).is_some()
            && non_empty(&self.smtp_username).is_some()
            && non_empty(&self.smtp_password).is_some()
            && non_empty(&self.from_email).is_some()
    }

    /// Port 465 speaks TLS from the first byte; every other port upgrades via STARTTLS
    pub fn implicit_tls(&self) -> bool {
        self.smtp_port == 465
    }

    /// Override settings from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Override settings from an arbitrary variable lookup
    ///
    /// Only variables that are present replace file values. `EMAIL_ENABLED`
    /// enables delivery only when set to exactly `1`.
    ///
    /// # Arguments
    ///
    /// * `lookup` - Returns the value of an environment variable, if set
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SMTP_HOST") {
            self.smtp_host = Some(host);
        }
        if let Some(port) = lookup("SMTP_PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.smtp_port = port,
                Err(_) => warn!("Ignoring invalid SMTP_PORT value: {}", port),
            }
        }
        if let Some(username) = lookup("SMTP_USERNAME") {
            self.smtp_username = Some(username);
        }
        if let Some(password) = lookup("SMTP_PASSWORD") {
            self.smtp_password = Some(password);
        }
        if let Some(from) = lookup("EMAIL_FROM") {
            self.from_email = Some(from);
        }
        if let Some(name) = lookup("EMAIL_FROM_NAME") {
            self.from_name = name;
        }
        if let Some(enabled) = lookup("EMAIL_ENABLED") {
            self.enabled = enabled == "1";
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_username: Some("monitor".to_string()),
            smtp_password: Some("secret".to_string()),
            from_email: Some("alerts@example.com".to_string()),
            ..EmailConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = EmailConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.from_name, "MonitorScope Alerts");
        assert!(!config.is_configured());
        assert!(!config.implicit_tls());
    }

    #[test]
    fn test_required_fields() {
        assert!(complete().has_required_fields());

        let mut config = complete();
        config.smtp_password = Some("  ".to_string());
        assert!(!config.has_required_fields());

        let mut config = complete();
        config.from_email = None;
        assert!(!config.has_required_fields());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("SMTP_HOST", "mail.internal"),
            ("SMTP_PORT", "465"),
            ("EMAIL_FROM_NAME", "Ops"),
            ("EMAIL_ENABLED", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = EmailConfig::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.smtp_host.as_deref(), Some("mail.internal"));
        assert_eq!(config.smtp_port, 465);
        assert!(config.implicit_tls());
        assert_eq!(config.from_name, "Ops");
        assert!(config.enabled);
        // Untouched values keep their file/default state
        assert_eq!(config.smtp_username, None);
    }

    #[test]
    fn test_email_enabled_requires_exact_one() {
        let mut config = complete();
        config.apply_env_with(|key| (key == "EMAIL_ENABLED").then(|| "true".to_string()));
        assert!(!config.enabled);
    }

    #[test]
    fn test_invalid_port_is_ignored() {
        let mut config = EmailConfig::default();
        config.apply_env_with(|key| (key == "SMTP_PORT").then(|| "smtp".to_string()));
        assert_eq!(config.smtp_port, 587);
    }

    #[test]
    fn test_debug_masks_password() {
        let rendered = format!("{:?}", complete());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("********"));
    }
}
