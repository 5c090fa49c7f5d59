/// Error types for the check engine
pub mod error;

/// Core data types: targets, observations, alerts, recipients
pub mod model;

/// Configuration management
pub mod config;

/// Store traits with SQLite and in-memory backends
pub mod storage;

/// HTTP probe and outcome classification
pub mod probe;

/// Alert lifecycle and re-notification gating
pub mod alerts;

/// Alert email rendering and SMTP delivery
pub mod notify;

/// Per-target check pipeline and parallel fan-out
pub mod orchestrator;

/// Health labels and read-only views
pub mod dashboard;

/// Wiring configuration into a running engine
pub mod app;

// Re-export commonly used types
pub use error::{CheckError, ConfigError, NotifyError, SetupError, StoreError};
pub use orchestrator::{CheckOrchestrator, CheckReport, CycleSummary};
