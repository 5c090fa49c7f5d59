use super::{Probe, ProbeFailure, ProbeResult};
use crate::model::Target;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONNECTION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// HTTP GET probe
///
/// Sends one GET per check with the default headers overlaid by the target's
/// custom headers, and gives up after `timeout`.
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
    user_agent: HeaderValue,
}

impl HttpProbe {
    /// Create a new HTTP probe
    ///
    /// # Arguments
    /// * `timeout` - Hard limit for a single request
    /// * `user_agent` - Value of the default `User-Agent` header
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        let user_agent = HeaderValue::from_str(user_agent).unwrap_or_else(|_| {
            warn!("Invalid user agent '{}', using default", user_agent);
            HeaderValue::from_static("MonitorScope/1.0")
        });

        Ok(Self {
            client,
            timeout,
            user_agent,
        })
    }

    /// Default headers with the target's custom headers on top
    fn request_headers(&self, target: &Target) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let raw = match target.headers.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return headers,
        };

        let custom = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(
                    "Custom headers for {} are not a JSON object, using defaults",
                    target.name
                );
                return headers;
            }
            Err(e) => {
                warn!(
                    "Failed to parse custom headers for {}: {}, using defaults",
                    target.name, e
                );
                return headers;
            }
        };

        for (name, value) in custom {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    warn!(
                        "Skipping header '{}' for {}: unsupported value {}",
                        name, target.name, other
                    );
                    continue;
                }
            };
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(header_name), Ok(header_value)) => {
                    headers.insert(header_name, header_value);
                }
                _ => warn!("Skipping invalid header '{}' for {}", name, target.name),
            }
        }

        headers
    }

    async fn execute(&self, target: &Target) -> ProbeResult {
        let request = self
            .client
            .get(&target.url)
            .headers(self.request_headers(target));

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, request.send()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Err(_) => self.timed_out(elapsed_ms),
            Ok(Err(e)) if e.is_timeout() => self.timed_out(elapsed_ms),
            Ok(Err(e)) => {
                debug!("Request to {} failed: {:?}", target.url, e);
                ProbeResult::down(ProbeFailure::Transport, elapsed_ms, describe_error(&e))
            }
            Ok(Ok(response)) => {
                classify_response(response.status(), elapsed_ms, target.effective_threshold())
            }
        }
    }

    fn timed_out(&self, elapsed_ms: u64) -> ProbeResult {
        ProbeResult::down(
            ProbeFailure::Timeout,
            elapsed_ms,
            format!("Request timeout ({})", format_duration(self.timeout)),
        )
    }
}

impl Probe for HttpProbe {
    fn check<'a>(
        &'a self,
        target: &'a Target,
    ) -> Pin<Box<dyn Future<Output = ProbeResult> + Send + 'a>> {
        Box::pin(self.execute(target))
    }
}

/// Classify a response that arrived within the timeout
///
/// Non-success statuses win over slowness; the threshold only applies to
/// successful responses.
pub fn classify_response(
    status: StatusCode,
    elapsed_ms: u64,
    threshold_ms: Option<u64>,
) -> ProbeResult {
    if !status.is_success() {
        return ProbeResult::down(
            ProbeFailure::HttpStatus(status.as_u16()),
            elapsed_ms,
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ),
        );
    }

    match threshold_ms {
        Some(threshold_ms) if threshold_ms > 0 && elapsed_ms > threshold_ms => ProbeResult::down(
            ProbeFailure::SlowResponse {
                elapsed_ms,
                threshold_ms,
            },
            elapsed_ms,
            format!(
                "Response time {}ms exceeds threshold of {}ms",
                elapsed_ms, threshold_ms
            ),
        ),
        _ => ProbeResult::up(elapsed_ms),
    }
}

/// Error text including its source chain
fn describe_error(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CheckStatus;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe(timeout: Duration) -> HttpProbe {
        HttpProbe::new(timeout, "MonitorScope/1.0").unwrap()
    }

    fn target_for(server: &MockServer, route: &str) -> Target {
        Target::new(1, "Test API", format!("{}{}", server.uri(), route))
    }

    #[test]
    fn test_classify_success() {
        let result = classify_response(StatusCode::OK, 120, Some(2000));
        assert_eq!(result, ProbeResult::up(120));
    }

    #[test]
    fn test_classify_http_error() {
        let result = classify_response(StatusCode::SERVICE_UNAVAILABLE, 40, None);
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(
            result.error_message.as_deref(),
            Some("HTTP 503: Service Unavailable")
        );
        assert_eq!(result.response_time_ms, 40);
    }

    #[test]
    fn test_classify_status_wins_over_slowness() {
        let result = classify_response(StatusCode::INTERNAL_SERVER_ERROR, 5000, Some(100));
        assert_eq!(result.failure, Some(ProbeFailure::HttpStatus(500)));
    }

    #[test]
    fn test_classify_slow_response() {
        let result = classify_response(StatusCode::OK, 2500, Some(2000));
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Response time 2500ms exceeds threshold of 2000ms")
        );
    }

    #[test]
    fn test_classify_threshold_boundary_and_zero() {
        assert!(classify_response(StatusCode::OK, 2000, Some(2000)).is_up());
        assert!(classify_response(StatusCode::OK, 9999, Some(0)).is_up());
        assert!(classify_response(StatusCode::NO_CONTENT, 9999, None).is_up());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn test_request_headers_overlay() {
        let probe = probe(Duration::from_secs(1));
        let mut target = Target::new(1, "api", "https://api.example.com");
        target.headers =
            Some(r#"{"Authorization": "Bearer x", "Accept": "text/plain", "X-Retry": 3}"#.to_string());

        let headers = probe.request_headers(&target);
        assert_eq!(headers.get("authorization").unwrap(), "Bearer x");
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/plain");
        assert_eq!(headers.get("x-retry").unwrap(), "3");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "MonitorScope/1.0");
        assert_eq!(headers.get(CONNECTION).unwrap(), "close");
    }

    #[test]
    fn test_malformed_headers_fall_back_to_defaults() {
        let probe = probe(Duration::from_secs(1));
        let mut target = Target::new(1, "api", "https://api.example.com");

        for raw in ["{not json", "[\"a\"]", ""] {
            target.headers = Some(raw.to_string());
            let headers = probe.request_headers(&target);
            assert_eq!(headers.len(), 3);
            assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        }
    }

    #[test]
    fn test_invalid_header_entries_are_skipped() {
        let probe = probe(Duration::from_secs(1));
        let mut target = Target::new(1, "api", "https://api.example.com");
        target.headers = Some(r#"{"Bad Header": "x", "X-Ok": "yes", "X-Null": null}"#.to_string());

        let headers = probe.request_headers(&target);
        assert_eq!(headers.get("x-ok").unwrap(), "yes");
        assert!(headers.get("x-null").is_none());
        assert_eq!(headers.len(), 4);
    }

    #[tokio::test]
    async fn test_probe_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = probe(Duration::from_secs(5))
            .check(&target_for(&server, "/health"))
            .await;
        assert_eq!(result.status, CheckStatus::Up);
        assert_eq!(result.error_message, None);
    }

    #[tokio::test]
    async fn test_probe_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = probe(Duration::from_secs(5))
            .check(&target_for(&server, "/health"))
            .await;
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(
            result.error_message.as_deref(),
            Some("HTTP 503: Service Unavailable")
        );
    }

    #[tokio::test]
    async fn test_probe_sends_custom_and_default_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure"))
            .and(header("authorization", "Bearer x"))
            .and(header("accept", "application/json"))
            .and(header("user-agent", "MonitorScope/1.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut target = target_for(&server, "/secure");
        target.headers = Some(r#"{"Authorization":"Bearer x"}"#.to_string());

        let result = probe(Duration::from_secs(5)).check(&target).await;
        // wiremock answers 404 when the header matchers do not match
        assert_eq!(result.status, CheckStatus::Up);
    }

    #[tokio::test]
    async fn test_probe_malformed_headers_still_checks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut target = target_for(&server, "/");
        target.headers = Some("{{{".to_string());

        let result = probe(Duration::from_secs(5)).check(&target).await;
        assert_eq!(result.status, CheckStatus::Up);
    }

    #[tokio::test]
    async fn test_probe_slow_response_exceeds_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let mut target = target_for(&server, "/");
        target.alert_threshold = Some(100);

        let result = probe(Duration::from_secs(5)).check(&target).await;
        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.response_time_ms >= 300);
        let message = result.error_message.unwrap();
        assert!(message.starts_with("Response time "));
        assert!(message.contains(&format!("{}ms", result.response_time_ms)));
        assert!(message.ends_with("exceeds threshold of 100ms"));
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let result = probe(Duration::from_millis(200))
            .check(&target_for(&server, "/"))
            .await;
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.failure, Some(ProbeFailure::Timeout));
        assert_eq!(
            result.error_message.as_deref(),
            Some("Request timeout (200ms)")
        );
        assert!(result.response_time_ms >= 200);
        assert!(result.response_time_ms < 2000);
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let target = Target::new(1, "closed", "http://127.0.0.1:1/health");

        let result = probe(Duration::from_secs(5)).check(&target).await;
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.failure, Some(ProbeFailure::Transport));
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn test_probe_invalid_url() {
        let target = Target::new(1, "broken", "not a url");

        let result = probe(Duration::from_secs(5)).check(&target).await;
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.failure, Some(ProbeFailure::Transport));
    }
}
