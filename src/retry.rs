// Retrying HTTP request sender. Every request the tool issues goes
// through `send_with_retry`, which re-issues the request on transient
// failures with exponential backoff. The knobs live in `RetryPolicy` so
// the behavior is configuration, not bespoke control flow.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

/// Retry configuration: maximum retry count, backoff multiplier, the set
/// of HTTP statuses that trigger a retry, the methods eligible for retry
/// and a per-request timeout.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total number of retries after the initial attempt.
    pub retries: u32,
    /// Multiplier for the exponential backoff delay, in seconds.
    pub backoff_factor: f64,
    /// Statuses that count as transient and are retried.
    pub status_forcelist: Vec<StatusCode>,
    /// Methods eligible for retry. Requests with other methods are sent
    /// exactly once.
    pub allowed_methods: Vec<Method>,
    /// Overall timeout applied to each individual attempt.
    pub request_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff_factor: 1.0,
            status_forcelist: vec![
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
            allowed_methods: vec![
                Method::HEAD,
                Method::GET,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
                Method::TRACE,
                Method::POST,
            ],
            request_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// Whether `status` is in the forcelist of transient statuses.
    pub fn should_retry_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status)
    }

    /// Whether requests with `method` are eligible for retry at all.
    pub fn allows_method(&self, method: &Method) -> bool {
        self.allowed_methods.contains(method)
    }

    /// Backoff delay before re-issuing the request after `attempt`
    /// failed attempts: `backoff_factor * 2^attempt` seconds.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor * f64::from(2u32.saturating_pow(attempt));
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Send a request with retries. `build` is called once per attempt so a
/// fresh request (including its body) exists for every try.
///
/// Outcomes:
/// - a response with a non-forcelisted status is returned immediately,
/// - a forcelisted status is retried up to `policy.retries` times; once
///   retries are exhausted the last response is returned so the caller
///   can inspect and log the status,
/// - a connection/read-level failure is retried the same way and, once
///   exhausted, surfaces as an error.
pub fn send_with_retry<F>(client: &Client, policy: &RetryPolicy, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt: u32 = 0;
    loop {
        let mut builder = build();
        if let Some(timeout) = policy.request_timeout {
            builder = builder.timeout(timeout);
        }
        let request = builder.build().context("building HTTP request")?;
        let method = request.method().clone();
        let url = request.url().clone();
        let retry_eligible = policy.allows_method(&method);

        match client.execute(request) {
            Ok(response) => {
                let status = response.status();
                if !retry_eligible || attempt >= policy.retries || !policy.should_retry_status(status)
                {
                    return Ok(response);
                }
                warn!(%url, %status, attempt, "retrying after transient status");
            }
            Err(err) => {
                if !retry_eligible || attempt >= policy.retries {
                    return Err(err).with_context(|| {
                        format!("{} {} failed after {} attempts", method, url, attempt + 1)
                    });
                }
                warn!(%url, error = %err, attempt, "retrying after transport error");
            }
        }

        let delay = policy.delay_for_attempt(attempt);
        debug!(?delay, attempt, "backing off before retry");
        thread::sleep(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_forcelist_matches_transient_statuses() {
        let policy = RetryPolicy::default();
        for code in [429u16, 500, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(policy.should_retry_status(status), "{code} should retry");
        }
        for code in [200u16, 201, 400, 404, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!policy.should_retry_status(status), "{code} should not retry");
        }
    }

    #[test]
    fn all_standard_methods_are_retry_eligible() {
        let policy = RetryPolicy::default();
        for method in [
            Method::HEAD,
            Method::GET,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::TRACE,
            Method::POST,
        ] {
            assert!(policy.allows_method(&method));
        }
    }

    #[test]
    fn delay_grows_exponentially_with_attempt() {
        let policy = RetryPolicy {
            backoff_factor: 1.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_scales_with_backoff_factor() {
        let policy = RetryPolicy {
            backoff_factor: 0.5,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
    }

    #[test]
    fn zero_backoff_factor_means_no_sleep() {
        let policy = RetryPolicy {
            backoff_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(5), Duration::ZERO);
    }
}
