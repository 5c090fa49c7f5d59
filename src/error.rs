use thiserror::Error;

/// Errors raised by the history, alert and target stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Active alert already exists for target {0}")]
    ActiveAlertExists(i64),

    #[error("Alert not found: {0}")]
    AlertNotFound(i64),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Errors that can occur when sending alert emails
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Email configuration not found")]
    NotConfigured,

    #[error("Email alerts are disabled")]
    Disabled,

    #[error("Missing required email configuration fields")]
    MissingFields,

    #[error("Invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    MessageBuild(String),

    #[error("SMTP connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to send notification: {0}")]
    SendFailed(String),

    #[error("Failed to send {} of {total} emails: {errors:?}", .errors.len())]
    BatchFailed {
        total: usize,
        errors: Vec<NotifyError>,
    },
}

/// Errors that abort the check of a single target
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Target not found or inactive: {0}")]
    TargetNotFound(i64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while assembling the engine from configuration
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Failed to open storage: {0}")]
    Storage(#[from] StoreError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
