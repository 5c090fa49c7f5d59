/// Alert lifecycle and re-notification gate
pub mod lifecycle;
pub mod renotify;

pub use lifecycle::{alert_message, AlertDecision, AlertLifecycle, AlertTransition};
pub use renotify::RenotifyGate;
