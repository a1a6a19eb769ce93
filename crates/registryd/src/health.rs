//! Liveness probe for registered agents.

use std::time::{Duration, Instant};

use chrono::Utc;
use registry_core::{AgentDescriptor, HealthResult, HealthStatus};
use tracing::{debug, warn};

/// Probe timeout when neither the caller nor the config supplies one.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Floor applied to the configured default timeout.
const MIN_DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Issues one bounded `GET {url}/ping` per call.
///
/// `probe` never fails: every outcome, including timeouts and malformed
/// URLs, is folded into the returned [`HealthResult`].
#[derive(Debug, Clone)]
pub struct HealthProbe {
    http: reqwest::Client,
    default_timeout: Duration,
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl HealthProbe {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            default_timeout: default_timeout.max(MIN_DEFAULT_TIMEOUT),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Liveness URL for a descriptor.
    pub fn ping_url(agent: &AgentDescriptor) -> String {
        format!("{}/ping", agent.url.trim_end_matches('/'))
    }

    /// Probe `agent`. Callers check `agent.enabled` beforehand.
    ///
    /// A zero or absent `timeout` uses the configured default.
    pub async fn probe(&self, agent: &AgentDescriptor, timeout: Option<Duration>) -> HealthResult {
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(self.default_timeout);
        let url = Self::ping_url(agent);
        let started = Instant::now();

        let outcome = tokio::time::timeout(timeout, self.http.get(&url).send()).await;
        let elapsed_ms = Some(started.elapsed().as_millis() as u64);

        let result = match outcome {
            Ok(Ok(response)) => {
                let code = response.status().as_u16();
                if code == 200 {
                    healthy(code, elapsed_ms)
                } else {
                    unhealthy(Some(code), format!("unexpected status code {code}"), elapsed_ms)
                }
            }
            Err(_) => unhealthy(None, "timed out".to_string(), elapsed_ms),
            Ok(Err(e)) if e.is_timeout() => unhealthy(None, "timed out".to_string(), elapsed_ms),
            Ok(Err(e)) if e.is_builder() => {
                unhealthy(None, "unexpected error while probing agent".to_string(), None)
            }
            Ok(Err(e)) => unhealthy(None, format!("request failed: {e}"), elapsed_ms),
        };

        match result.status {
            HealthStatus::Healthy => debug!(path = %agent.path, url = %url, "agent healthy"),
            HealthStatus::Unhealthy => warn!(
                path = %agent.path,
                url = %url,
                detail = result.detail.as_deref().unwrap_or(""),
                "agent unhealthy"
            ),
        }

        result
    }
}

fn healthy(code: u16, response_time_ms: Option<u64>) -> HealthResult {
    HealthResult {
        status: HealthStatus::Healthy,
        status_code: Some(code),
        detail: None,
        response_time_ms,
        checked_at: Utc::now(),
    }
}

fn unhealthy(code: Option<u16>, detail: String, response_time_ms: Option<u64>) -> HealthResult {
    HealthResult {
        status: HealthStatus::Unhealthy,
        status_code: code,
        detail: Some(detail),
        response_time_ms,
        checked_at: Utc::now(),
    }
}
