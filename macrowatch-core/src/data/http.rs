//! Shared blocking HTTP plumbing: client construction and GET with retry.
//!
//! Retries use exponential backoff (`base_delay × 2^(attempt−1)`) on
//! connect/timeout errors, 429 and 5xx. A 429 `Retry-After` hint stretches
//! the next delay, capped at the request timeout. 403 trips the provider's
//! breaker at once; 400/404 mean the id does not exist upstream and are not
//! retried, unless a 400 body names the API key.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::circuit_breaker::CircuitBreaker;
use super::provider::DataError;

/// Upper bound on `max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// HTTP behaviour shared by every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout in seconds. This is the only bound on latency.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Base backoff in milliseconds.
    pub base_delay_ms: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_retries: 2,
            base_delay_ms: 500,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 macrowatch".into(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Sleep before retry `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = self.base_delay().saturating_mul(factor);
        match retry_after {
            Some(hint) => backoff.max(hint.min(self.timeout())),
            None => backoff,
        }
    }
}

/// Build a blocking client honouring the timeout and user agent.
pub fn build_client(settings: &HttpSettings) -> Result<Client, DataError> {
    Client::builder()
        .timeout(settings.timeout())
        .user_agent(settings.user_agent.clone())
        .build()
        .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))
}

/// GET `url` with `query`, retrying transient failures, and return the body.
///
/// `id` names the upstream series in errors and logs.
pub(crate) fn get_text(
    client: &Client,
    breaker: &CircuitBreaker,
    settings: &HttpSettings,
    url: &str,
    query: &[(&str, String)],
    id: &str,
) -> Result<String, DataError> {
    if !breaker.is_allowed() {
        return Err(DataError::CircuitBreakerTripped);
    }

    let mut last_error = None;
    let mut retry_after: Option<Duration> = None;

    for attempt in 0..=settings.max_retries.min(MAX_RETRIES) {
        if attempt > 0 {
            std::thread::sleep(settings.retry_delay(attempt, retry_after.take()));
        }

        if !breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        match client.get(url).query(query).send() {
            Ok(resp) => {
                let status = resp.status();

                if status == StatusCode::FORBIDDEN {
                    breaker.trip();
                    return Err(DataError::CircuitBreakerTripped);
                }

                if status == StatusCode::TOO_MANY_REQUESTS {
                    breaker.record_failure();
                    let hint = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse::<u64>().ok());
                    retry_after = hint.map(Duration::from_secs);
                    last_error = Some(DataError::RateLimited {
                        retry_after_secs: hint.unwrap_or(60),
                    });
                    continue;
                }

                if status == StatusCode::UNAUTHORIZED {
                    return Err(DataError::AuthenticationRequired(format!(
                        "upstream rejected credentials for {id}"
                    )));
                }

                if status == StatusCode::BAD_REQUEST {
                    let body = resp.text().unwrap_or_default();
                    if body.to_ascii_lowercase().contains("api_key") {
                        return Err(DataError::AuthenticationRequired(format!(
                            "upstream rejected the API key for {id}"
                        )));
                    }
                    return Err(DataError::SeriesNotFound { id: id.to_string() });
                }

                if status == StatusCode::NOT_FOUND {
                    return Err(DataError::SeriesNotFound { id: id.to_string() });
                }

                if !status.is_success() {
                    breaker.record_failure();
                    last_error = Some(DataError::Http {
                        status: status.as_u16(),
                        id: id.to_string(),
                    });
                    continue;
                }

                let body = resp.text().map_err(|e| {
                    DataError::ResponseFormatChanged(format!("unreadable body for {id}: {e}"))
                })?;
                breaker.record_success();
                return Ok(body);
            }
            Err(e) => {
                if e.is_connect() || e.is_timeout() {
                    tracing::debug!(id, attempt, error = %e, "transient HTTP failure");
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                return Err(DataError::NetworkUnreachable(e.to_string()));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
}
