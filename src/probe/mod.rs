//! Health probes
//!
//! A probe performs exactly one request against a target and turns whatever
//! happens into a [`ProbeResult`]. Probes never return errors: transport
//! failures, timeouts and bad statuses are all `DOWN` results.

mod http;

pub use http::{classify_response, HttpProbe};

use crate::model::{CheckStatus, Target};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Trait for health probe implementations
pub trait Probe: Send + Sync {
    fn check<'a>(
        &'a self,
        target: &'a Target,
    ) -> Pin<Box<dyn Future<Output = ProbeResult> + Send + 'a>>;
}

/// Why a check was classified as `DOWN`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeFailure {
    /// Connection, DNS, TLS or protocol error
    Transport,
    /// No response within the probe timeout
    Timeout,
    /// Response with a non-2xx status code
    HttpStatus(u16),
    /// Successful response slower than the target's threshold
    SlowResponse { elapsed_ms: u64, threshold_ms: u64 },
}

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: CheckStatus,
    /// Wall-clock time of the attempt, reported for failures too
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    pub failure: Option<ProbeFailure>,
}

impl ProbeResult {
    pub fn up(response_time_ms: u64) -> Self {
        Self {
            status: CheckStatus::Up,
            response_time_ms,
            error_message: None,
            failure: None,
        }
    }

    pub fn down(failure: ProbeFailure, response_time_ms: u64, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Down,
            response_time_ms,
            error_message: Some(message.into()),
            failure: Some(failure),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}
